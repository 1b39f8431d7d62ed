use std::collections::{HashSet, VecDeque};
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use image::{DynamicImage, ImageOutputFormat, RgbImage};

use randomizer_download::FetchedImage;

use crate::controller::{AutoCycleController, CycleInput, CycleOutcome, CycleState};
use crate::error::{Error, Result};
use crate::exclusion::{ExclusionSet, ExclusionStore};
use crate::options::RandomizerOptions;
use crate::post::{Post, SearchConstraints, SearchPage};
use crate::request::{GenerationRequest, ProcessingMode, INCLUDE_TAGS_KEY, POST_URL_KEY};
use crate::selection::select;
use crate::session::SessionState;
use crate::source::{ImageFetcher, PostSource};

// MARK: Fakes

enum Behavior {
    Posts { posts: Vec<Post>, total_count: Option<u64> },
    Upstream(u16),
    Unauthorized,
    IOError,
    /// One step per call, the last one repeats.
    Script(Mutex<VecDeque<Behavior>>),
}

impl Behavior {
    fn respond(&self) -> Result<SearchPage> {
        match self {
            Behavior::Posts { posts, total_count } => Ok(SearchPage {
                posts: posts.clone(),
                total_count: *total_count,
            }),
            Behavior::Upstream(status) => Err(Error::Upstream { status: *status }),
            Behavior::Unauthorized => Err(gelbooru_client::Error::Unauthorized.into()),
            Behavior::IOError => Err(std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only").into()),
            Behavior::Script(steps) => {
                let mut steps = steps.lock().unwrap();
                match steps.len() {
                    0 => Err(Error::NoCandidate),
                    1 => steps[0].respond(),
                    _ => steps.pop_front().unwrap().respond(),
                }
            }
        }
    }
}

struct FakeSource {
    behavior: Behavior,
    credential: bool,
    calls: AtomicUsize,
    queries: Mutex<Vec<SearchConstraints>>,
}

impl FakeSource {
    fn new(behavior: Behavior) -> Self {
        Self {
            behavior,
            credential: true,
            calls: AtomicUsize::new(0),
            queries: Mutex::new(Vec::new()),
        }
    }

    fn posts(posts: Vec<Post>, total_count: Option<u64>) -> Self {
        Self::new(Behavior::Posts { posts, total_count })
    }

    fn script(steps: Vec<Behavior>) -> Self {
        Self::new(Behavior::Script(Mutex::new(steps.into())))
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PostSource for FakeSource {
    fn has_credential(&self) -> bool {
        self.credential
    }

    async fn search(&self, constraints: &SearchConstraints, _limit: u32) -> Result<SearchPage> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.queries.lock().unwrap().push(constraints.clone());
        self.behavior.respond()
    }
}

#[derive(Default)]
struct FakeFetcher {
    unreachable: HashSet<String>,
    broken: HashSet<String>,
    probes: AtomicUsize,
}

#[async_trait]
impl ImageFetcher for FakeFetcher {
    async fn probe(&self, url: &str) -> Result<()> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        if self.unreachable.contains(url) {
            return Err(Error::Upstream { status: 404 });
        }
        Ok(())
    }

    async fn fetch(&self, url: &str) -> Result<FetchedImage> {
        let bytes = if self.broken.contains(url) {
            b"<html>not an image</html>".to_vec()
        } else {
            png_bytes(1600, 1200)
        };
        Ok(FetchedImage {
            url: url.to_string(),
            bytes,
            mime_type: Some("image/png".to_string()),
        })
    }
}

fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = DynamicImage::ImageRgb8(RgbImage::new(width, height));
    let mut buffer = Cursor::new(Vec::new());
    img.write_to(&mut buffer, ImageOutputFormat::Png).unwrap();
    buffer.into_inner()
}

fn post(id: u64, tags: &str) -> Post {
    Post {
        id,
        tags: tags.split_whitespace().map(|t| t.to_string()).collect(),
        file_url: Some(image_url(id)),
        width: 1600,
        height: 1200,
        page_url: format!("https://gelbooru.com/index.php?page=post&s=view&id={}", id),
        creator_id: None,
        owner: None,
        score: 0,
        rating: "general".to_string(),
        created_at: None,
    }
}

fn image_url(id: u64) -> String {
    format!("https://img.example/{}.png", id)
}

fn options() -> RandomizerOptions {
    RandomizerOptions {
        retry_delay_ms: 0,
        ..Default::default()
    }
}

fn controller(source: FakeSource, fetcher: FakeFetcher) -> AutoCycleController<FakeSource, FakeFetcher> {
    controller_with_exclusions(source, fetcher, "/nonexistent/removal_tags.txt")
}

fn controller_with_exclusions(
    source: FakeSource,
    fetcher: FakeFetcher,
    path: impl Into<std::path::PathBuf>,
) -> AutoCycleController<FakeSource, FakeFetcher> {
    AutoCycleController::new(source, fetcher, ExclusionStore::new(path), options())
}

fn input(include: &str, exclude: &str) -> CycleInput {
    CycleInput {
        enabled: true,
        include: include.to_string(),
        exclude: exclude.to_string(),
    }
}

fn txt2img(id: u64) -> GenerationRequest {
    GenerationRequest::new(id, "masterpiece", ProcessingMode::TextToImage, 10)
}

fn img2img(id: u64) -> GenerationRequest {
    GenerationRequest::new(id, "masterpiece", ProcessingMode::ImageToImage, 10)
}

fn applied_id(outcome: &CycleOutcome) -> u64 {
    match outcome {
        CycleOutcome::Applied { post_id, .. } => *post_id,
        other => panic!("expected applied outcome, got {:?}", other),
    }
}

// MARK: Selection

#[tokio::test]
async fn test_select_skips_used_missing_and_unreachable() {
    let mut no_url = post(2, "b");
    no_url.file_url = None;
    let candidates = vec![post(1, "a"), no_url, post(3, "c"), post(4, "d")];
    let fetcher = FakeFetcher {
        unreachable: HashSet::from([image_url(3)]),
        ..Default::default()
    };
    let mut session = SessionState::new();
    session.register(1);

    let selection = select(&candidates, &mut session, &ExclusionSet::new(), &fetcher)
        .await
        .unwrap();
    assert_eq!(selection.post_id, 4);
    assert_eq!(selection.image_url, image_url(4));
    assert_eq!(selection.post_url, "https://gelbooru.com/index.php?page=post&s=view&id=4");
    assert!(session.contains(4));
    // The unreachable candidate is not spent.
    assert!(!session.contains(3));
    assert_eq!(fetcher.probes.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_select_filters_excluded_tags() {
    let candidates = vec![post(1, "1girl text long_hair watermark")];
    let exclusion = ExclusionSet::from(["text".to_string(), "watermark".to_string()]);
    let mut session = SessionState::new();
    let selection = select(&candidates, &mut session, &exclusion, &FakeFetcher::default())
        .await
        .unwrap();
    assert_eq!(selection.tag_string(), "1girl, long_hair");
}

#[tokio::test]
async fn test_select_never_returns_a_post_twice() {
    let candidates = (1..=5).map(|id| post(id, "tag")).collect::<Vec<_>>();
    let fetcher = FakeFetcher::default();
    let mut session = SessionState::new();
    let mut seen = HashSet::new();
    while let Some(selection) = select(&candidates, &mut session, &ExclusionSet::new(), &fetcher).await {
        assert!(seen.insert(selection.post_id), "post {} returned twice", selection.post_id);
    }
    assert_eq!(seen.len(), 5);
}

#[tokio::test]
async fn test_select_reports_exhaustion() {
    let candidates = (1..=5).map(|id| post(id, "tag")).collect::<Vec<_>>();
    let fetcher = FakeFetcher::default();
    let mut session = SessionState::new();
    session.set_total_count(Some(2));
    session.register(100);
    session.register(101);
    for _ in 0..3 {
        assert!(select(&candidates, &mut session, &ExclusionSet::new(), &fetcher)
            .await
            .is_none());
    }
    assert_eq!(fetcher.probes.load(Ordering::SeqCst), 0);
}

// MARK: Controller

#[tokio::test]
async fn test_disabled_does_nothing() {
    let mut controller = controller(FakeSource::posts(vec![post(1, "a")], None), FakeFetcher::default());
    let mut request = txt2img(1);
    let outcome = controller.before_process(&mut request, &CycleInput::default()).await;
    assert_eq!(outcome, CycleOutcome::Disabled);
    assert_eq!(request.prompt, "masterpiece");
    assert_eq!(controller.source().calls(), 0);
}

#[tokio::test]
async fn test_applies_tags_and_metadata() {
    let mut controller = controller(
        FakeSource::posts(vec![post(7, "long_hair ^_^ 1girl")], None),
        FakeFetcher::default(),
    );
    let mut request = txt2img(1);
    let outcome = controller.before_process(&mut request, &input("1girl, {solo|solo}", "")).await;

    assert_eq!(outcome, CycleOutcome::Applied { post_id: 7, cached: false });
    assert_eq!(request.prompt, "masterpiece, long hair, ^_^, 1girl");
    assert_eq!(request.extra_generation_params[INCLUDE_TAGS_KEY], "1girl, {solo|solo}");
    assert_eq!(
        request.extra_generation_params[POST_URL_KEY],
        "https://gelbooru.com/index.php?page=post&s=view&id=7"
    );
    assert!(request.init_images.is_empty());
    assert_eq!((request.width, request.height), (1024, 1024));
    assert_eq!(controller.state(), CycleState::Done);

    let queries = controller.source().queries.lock().unwrap();
    assert_eq!(queries[0].include, vec!["1girl", "solo"]);
}

#[tokio::test]
async fn test_metadata_is_written_once() {
    let mut controller = controller(FakeSource::posts(vec![post(7, "a")], None), FakeFetcher::default());
    let mut request = txt2img(1);
    request
        .extra_generation_params
        .insert(POST_URL_KEY.to_string(), "kept".to_string());
    controller.before_process(&mut request, &input("", "")).await;
    assert_eq!(request.extra_generation_params[POST_URL_KEY], "kept");
    assert!(!request.extra_generation_params.contains_key(INCLUDE_TAGS_KEY));
}

#[tokio::test]
async fn test_one_fetch_per_request() {
    let posts = (1..=3).map(|id| post(id, "a")).collect();
    let mut controller = controller(FakeSource::posts(posts, None), FakeFetcher::default());

    let mut first = txt2img(1);
    let outcome = controller.before_process(&mut first, &input("a", "")).await;
    let id = applied_id(&outcome);

    // The same request asks again: the cached post is reused.
    let mut again = txt2img(1);
    let outcome = controller.before_process(&mut again, &input("a", "")).await;
    assert_eq!(outcome, CycleOutcome::Applied { post_id: id, cached: true });
    assert_eq!(controller.source().calls(), 1);

    // A new request fetches a new post.
    let mut next = txt2img(2);
    let outcome = controller.before_process(&mut next, &input("a", "")).await;
    assert_ne!(applied_id(&outcome), id);
    assert_eq!(controller.source().calls(), 2);
}

#[tokio::test]
async fn test_no_post_is_reused_across_cycles() {
    let posts = (1..=4).map(|id| post(id, "a")).collect();
    let mut controller = controller(FakeSource::posts(posts, Some(4)), FakeFetcher::default());
    let mut seen = HashSet::new();
    for id in 1..=4 {
        let mut request = txt2img(id);
        let outcome = controller.before_process(&mut request, &input("a", "")).await;
        assert!(seen.insert(applied_id(&outcome)));
    }
    assert_eq!(seen.len(), 4);
}

#[tokio::test]
async fn test_exhaustion_stops_batch() {
    let posts = (1..=2).map(|id| post(id, "a")).collect();
    let mut controller = controller(FakeSource::posts(posts, Some(2)), FakeFetcher::default());

    let mut request = txt2img(1);
    controller.before_process(&mut request, &input("a", "")).await;
    assert_eq!(request.remaining_batches, 10);

    // Using the last known post caps the batch right away.
    let mut request = txt2img(2);
    let outcome = controller.before_process(&mut request, &input("a", "")).await;
    assert!(matches!(outcome, CycleOutcome::Applied { .. }));
    assert_eq!(request.remaining_batches, 1);

    // Later cycles report exhaustion without searching, and it is not an error.
    for id in 3..=5 {
        let mut request = txt2img(id);
        let outcome = controller.before_process(&mut request, &input("a", "")).await;
        assert_eq!(outcome, CycleOutcome::Exhausted);
        assert_eq!(request.remaining_batches, 1);
        assert_eq!(request.prompt, "masterpiece");
    }
    assert_eq!(controller.source().calls(), 2);
    assert!(!controller.is_fatal());
}

#[tokio::test]
async fn test_empty_result_is_exhaustion() {
    let mut controller = controller(FakeSource::posts(vec![], Some(0)), FakeFetcher::default());
    let mut request = txt2img(1);
    let outcome = controller.before_process(&mut request, &input("nonexistent_tag", "")).await;
    assert_eq!(outcome, CycleOutcome::Exhausted);
    assert_eq!(controller.source().calls(), 1);
    assert_eq!(request.remaining_batches, 1);
}

#[tokio::test]
async fn test_retry_ladder_is_bounded() {
    let mut controller = controller(FakeSource::new(Behavior::Upstream(503)), FakeFetcher::default());
    let mut request = txt2img(1);
    let outcome = controller.before_process(&mut request, &input("a", "")).await;

    assert!(matches!(outcome, CycleOutcome::Failed(_)));
    // One attempt plus five retries.
    assert_eq!(controller.source().calls(), 6);
    assert!(controller.is_fatal());
    assert_eq!(controller.state(), CycleState::FatalStopped);
    assert_eq!(request.remaining_batches, 1);
    assert_eq!(request.prompt, "masterpiece");

    // Stopped until the constraints change.
    let mut request = txt2img(2);
    let outcome = controller.before_process(&mut request, &input("a", "")).await;
    assert_eq!(outcome, CycleOutcome::Stopped);
    assert_eq!(controller.source().calls(), 6);
}

#[tokio::test]
async fn test_retry_ladder_when_candidates_run_out() {
    let mut controller = controller(FakeSource::posts(vec![post(1, "a")], None), FakeFetcher::default());
    let mut request = txt2img(1);
    applied_id(&controller.before_process(&mut request, &input("a", "")).await);

    // Without a total count the engine cannot tell exhaustion apart from bad luck.
    let mut request = txt2img(2);
    let outcome = controller.before_process(&mut request, &input("a", "")).await;
    assert_eq!(outcome, CycleOutcome::Failed(Error::NoCandidate.to_string()));
    assert_eq!(controller.source().calls(), 1 + 6);
}

#[tokio::test]
async fn test_unauthorized_is_not_retried() {
    let mut controller = controller(FakeSource::new(Behavior::Unauthorized), FakeFetcher::default());
    let mut request = txt2img(1);
    let outcome = controller.before_process(&mut request, &input("a", "")).await;
    assert!(matches!(outcome, CycleOutcome::LoginRequired(_)));
    assert_eq!(controller.source().calls(), 1);
    assert_eq!(request.remaining_batches, 1);
}

#[tokio::test]
async fn test_missing_credentials() {
    let mut source = FakeSource::posts(vec![post(1, "a")], None);
    source.credential = false;
    let mut controller = controller(source, FakeFetcher::default());

    let mut request = txt2img(1);
    let outcome = controller.before_process(&mut request, &input("a", "")).await;
    assert_eq!(
        outcome,
        CycleOutcome::LoginRequired("You need to log in to your gelbooru account".to_string())
    );
    assert_eq!(controller.source().calls(), 0);

    let err = controller.randomize("a", "").await.unwrap_err();
    assert!(matches!(err, Error::NotLoggedIn(_)));
}

#[tokio::test]
async fn test_constraint_change_resets_session() {
    let mut controller = controller(FakeSource::new(Behavior::Upstream(500)), FakeFetcher::default());
    let mut request = txt2img(1);
    controller.before_process(&mut request, &input("a, b", "")).await;
    assert!(controller.is_fatal());

    // Same tags in another order are the same constraints.
    let mut request = txt2img(2);
    let outcome = controller.before_process(&mut request, &input("b, a", "")).await;
    assert_eq!(outcome, CycleOutcome::Stopped);

    // A different exclude list clears the fatal flag and searches again.
    let mut request = txt2img(3);
    let outcome = controller.before_process(&mut request, &input("a, b", "text")).await;
    assert!(matches!(outcome, CycleOutcome::Failed(_)));
    assert_eq!(controller.source().calls(), 12);
}

#[tokio::test]
async fn test_constraint_change_clears_registry_and_cache() {
    let posts = (1..=2).map(|id| post(id, "a")).collect();
    let mut controller = controller(FakeSource::posts(posts, Some(2)), FakeFetcher::default());

    let mut request = txt2img(1);
    let first = applied_id(&controller.before_process(&mut request, &input("a", "")).await);
    assert_eq!(controller.session().len(), 1);

    // Same request id, new constraints: the cache does not survive.
    let mut request = txt2img(1);
    let outcome = controller.before_process(&mut request, &input("b", "")).await;
    assert_eq!(outcome, CycleOutcome::Applied { post_id: first, cached: false });
    assert_eq!(controller.session().len(), 1);
    assert_eq!(controller.source().calls(), 2);
}

#[tokio::test]
async fn test_img2img_sets_image_and_resolution() {
    let mut controller = controller(FakeSource::posts(vec![post(5, "a")], None), FakeFetcher::default());
    let mut request = img2img(1);
    let outcome = controller.before_process(&mut request, &input("a", "")).await;
    assert_eq!(outcome, CycleOutcome::Applied { post_id: 5, cached: false });
    assert_eq!(request.init_images.len(), 1);
    assert_eq!(request.init_images[0].dimensions(), (1600, 1200));
    // 1600x1200 is 4:3, closest preset is 1152x896.
    assert_eq!((request.width, request.height), (1152, 896));
}

#[tokio::test]
async fn test_broken_image_spends_candidate() {
    let fetcher = FakeFetcher {
        broken: HashSet::from([image_url(1)]),
        ..Default::default()
    };
    let posts = vec![post(1, "a"), post(2, "b")];
    let mut controller = controller(FakeSource::posts(posts, None), fetcher);

    let mut request = img2img(1);
    let outcome = controller.before_process(&mut request, &input("a", "")).await;
    assert_eq!(outcome, CycleOutcome::ImageRejected { post_id: 1 });
    assert_eq!(request.prompt, "masterpiece");
    assert!(request.init_images.is_empty());
    assert!(request.extra_generation_params.is_empty());
    assert_eq!(request.remaining_batches, 10);
    assert!(!controller.is_fatal());

    // The rejected post stays registered even though the failure might have been
    // transient, and the cache was dropped so the next cycle fetches again.
    assert!(controller.session().contains(1));
    let mut request = img2img(2);
    let outcome = controller.before_process(&mut request, &input("a", "")).await;
    assert_eq!(outcome, CycleOutcome::Applied { post_id: 2, cached: false });
    assert_eq!(controller.source().calls(), 2);
}

#[tokio::test]
async fn test_broken_image_refetches_within_same_request() {
    let fetcher = FakeFetcher {
        broken: HashSet::from([image_url(1)]),
        ..Default::default()
    };
    let posts = vec![post(1, "a"), post(2, "b")];
    let mut controller = controller(FakeSource::posts(posts, None), fetcher);

    let mut request = img2img(1);
    controller.before_process(&mut request, &input("a", "")).await;
    let outcome = controller.before_process(&mut request, &input("a", "")).await;
    assert_eq!(outcome, CycleOutcome::Applied { post_id: 2, cached: false });
}

#[tokio::test]
async fn test_exclusion_list_applies_to_prompt() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("removal_tags.txt");
    let mut controller = controller_with_exclusions(
        FakeSource::posts(vec![post(1, "1girl text long_hair"), post(2, "solo watermark")], None),
        FakeFetcher::default(),
        &path,
    );
    controller.exclusion_mut().save("# noise\ntext, watermark\n").unwrap();

    let mut request = txt2img(1);
    controller.before_process(&mut request, &input("a", "")).await;
    assert_eq!(request.prompt, "masterpiece, 1girl, long hair");

    let preview = controller.randomize("a", "").await.unwrap();
    assert_eq!(preview.tags, "solo");
    assert_eq!(preview.image_url, image_url(2));
}

#[tokio::test]
async fn test_randomize_without_candidates() {
    let mut controller = controller(FakeSource::posts(vec![], None), FakeFetcher::default());
    let err = controller.randomize("a", "").await.unwrap_err();
    assert!(matches!(err, Error::NoCandidate));
    assert_eq!(err.to_string(), "Couldn't find a post with the specified tags");
    assert_eq!(controller.source().calls(), 1);
}

#[tokio::test]
async fn test_extra_filters_are_searched() {
    let source = FakeSource::posts(vec![post(1, "a")], None);
    let options = RandomizerOptions {
        extra_filters: vec!["score:>=10".to_string()],
        ..options()
    };
    let mut controller = AutoCycleController::new(
        source,
        FakeFetcher::default(),
        ExclusionStore::new("/nonexistent/removal_tags.txt"),
        options,
    );
    controller.randomize("solo", "text").await.unwrap();
    let queries = controller.source().queries.lock().unwrap();
    assert_eq!(queries[0].include, vec!["solo", "score:>=10"]);
    assert_eq!(queries[0].exclude, vec!["text"]);
}

#[tokio::test]
async fn test_reset_clears_fatal_state() {
    let mut controller = controller(FakeSource::new(Behavior::Upstream(502)), FakeFetcher::default());
    let mut request = txt2img(1);
    controller.before_process(&mut request, &input("a", "")).await;
    assert!(controller.is_fatal());
    controller.reset();
    assert!(!controller.is_fatal());
    assert_eq!(controller.state(), CycleState::Idle);
}

#[tokio::test]
async fn test_retry_ladder_recovers() {
    let source = FakeSource::script(vec![
        Behavior::Upstream(503),
        Behavior::Upstream(503),
        Behavior::Posts {
            posts: vec![post(9, "solo")],
            total_count: Some(5),
        },
    ]);
    let mut controller = controller(source, FakeFetcher::default());
    let mut request = txt2img(1);
    let outcome = controller.before_process(&mut request, &input("solo", "")).await;

    assert_eq!(outcome, CycleOutcome::Applied { post_id: 9, cached: false });
    assert_eq!(controller.source().calls(), 3);
    assert!(!controller.is_fatal());
    assert_eq!(controller.state(), CycleState::Done);
    assert_eq!(request.remaining_batches, 10);
    assert_eq!(request.prompt, "masterpiece, solo");
}

#[tokio::test]
async fn test_non_retryable_error_fails_once() {
    let mut controller = controller(FakeSource::new(Behavior::IOError), FakeFetcher::default());
    let mut request = txt2img(1);
    let outcome = controller.before_process(&mut request, &input("a", "")).await;
    assert!(matches!(outcome, CycleOutcome::Failed(_)));
    assert_eq!(controller.source().calls(), 1);
    assert!(controller.is_fatal());
    assert_eq!(request.remaining_batches, 1);
}

#[tokio::test]
async fn test_broken_last_image_stops_batch() {
    let fetcher = FakeFetcher {
        broken: HashSet::from([image_url(1)]),
        ..Default::default()
    };
    let mut controller = controller(FakeSource::posts(vec![post(1, "a")], Some(1)), fetcher);

    let mut request = img2img(1);
    let outcome = controller.before_process(&mut request, &input("a", "")).await;
    assert_eq!(outcome, CycleOutcome::ImageRejected { post_id: 1 });
    assert!(controller.session().is_exhausted());
    assert_eq!(request.remaining_batches, 1);
    assert!(!controller.is_fatal());

    let mut request = img2img(2);
    let outcome = controller.before_process(&mut request, &input("a", "")).await;
    assert_eq!(outcome, CycleOutcome::Exhausted);
    assert_eq!(controller.source().calls(), 1);
}
