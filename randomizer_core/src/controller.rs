// The auto-cycle controller runs one fetch-validate-apply pass per generation request.
//
// State survives across requests: the used-post session, the last seen constraints,
// the per-request cache and the fatal flag. A constraint change resets all of them.

use image::RgbImage;
use serde::Serialize;
use tokio_retry::strategy::FixedInterval;

use crate::error::{Error, Result, LOGIN_MESSAGE};
use crate::exclusion::{filter_tags, ExclusionStore};
use crate::options::RandomizerOptions;
use crate::post::SearchConstraints;
use crate::request::{append_prompt, GenerationRequest, INCLUDE_TAGS_KEY, POST_URL_KEY};
use crate::resolution::fit;
use crate::selection::{select, Selection};
use crate::session::SessionState;
use crate::source::{ImageFetcher, PostSource};
use crate::tags::display_tags;
use crate::util;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    Idle,
    ConstraintCheck,
    CacheLookup,
    Fetching,
    ValidatingImage,
    Applying,
    Done,
    /// Absorbing until the constraints change or [`AutoCycleController::reset`] is called.
    FatalStopped,
}

/// What the user entered for auto mode.
#[derive(Debug, Clone, Default)]
pub struct CycleInput {
    pub enabled: bool,
    pub include: String,
    pub exclude: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// Auto mode is off, the request was left alone.
    Disabled,
    /// Tags (and the init image, in img2img mode) were applied to the request.
    Applied { post_id: u64, cached: bool },
    /// The selected image could not be decoded. The request was left alone and the
    /// next cycle fetches another post.
    ImageRejected { post_id: u64 },
    /// Every known match for the constraints has been used.
    Exhausted,
    LoginRequired(String),
    /// The retry ladder ran out. The controller is now stopped.
    Failed(String),
    /// The controller was already stopped, nothing was fetched.
    Stopped,
}

/// Result of a manual randomize, for display.
#[derive(Debug, Clone, Serialize)]
pub struct Preview {
    pub tags: String,
    pub image_url: String,
    pub post_url: String,
}

#[derive(Debug, Clone)]
struct CycleCache {
    request_id: u64,
    selection: Selection,
}

pub struct AutoCycleController<S, F> {
    source: S,
    fetcher: F,
    options: RandomizerOptions,
    exclusion: ExclusionStore,
    session: SessionState,
    constraints: Option<SearchConstraints>,
    cache: Option<CycleCache>,
    fatal: bool,
    state: CycleState,
}

impl<S: PostSource, F: ImageFetcher> AutoCycleController<S, F> {
    pub fn new(source: S, fetcher: F, exclusion: ExclusionStore, options: RandomizerOptions) -> Self {
        Self {
            source,
            fetcher,
            options,
            exclusion,
            session: SessionState::new(),
            constraints: None,
            cache: None,
            fatal: false,
            state: CycleState::Idle,
        }
    }

    pub fn state(&self) -> CycleState {
        self.state
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    pub fn is_fatal(&self) -> bool {
        self.fatal
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    pub fn options(&self) -> &RandomizerOptions {
        &self.options
    }

    pub fn exclusion_mut(&mut self) -> &mut ExclusionStore {
        &mut self.exclusion
    }

    /// Forget everything learned this session, as if the constraints had changed.
    pub fn reset(&mut self) {
        self.session.reset();
        self.cache = None;
        self.fatal = false;
        self.constraints = None;
        self.state = CycleState::Idle;
    }

    /// Run one cycle for `request`, before the host generates it.
    /// Never fails: every problem is reported through the outcome and, when the host
    /// should stop issuing cycles, by capping `request.remaining_batches` to 1.
    pub async fn before_process(&mut self, request: &mut GenerationRequest, input: &CycleInput) -> CycleOutcome {
        if !input.enabled {
            return CycleOutcome::Disabled;
        }

        // 1. Constraint check
        self.state = CycleState::ConstraintCheck;
        let constraints = self.constraints_for(&input.include, &input.exclude);
        self.check_constraints(&constraints);
        if self.fatal {
            tracing::debug!("Randomizer is stopped, skipping request {}", request.id);
            return self.stop(request, CycleOutcome::Stopped);
        }
        if !self.source.has_credential() {
            tracing::error!("{}", LOGIN_MESSAGE);
            self.fatal = true;
            return self.stop(request, CycleOutcome::LoginRequired(LOGIN_MESSAGE.to_string()));
        }

        // 2. Cache lookup, then fetch at most once per request
        self.state = CycleState::CacheLookup;
        let (selection, cached) = match self.cached_selection(request.id) {
            Some(selection) => {
                tracing::debug!("Reusing post {} for request {}", selection.post_id, request.id);
                (selection, true)
            }
            None => {
                if self.session.is_exhausted() {
                    return self.exhausted(request);
                }
                self.state = CycleState::Fetching;
                match self.fetch_with_retry(&constraints).await {
                    Ok(selection) => {
                        self.cache = Some(CycleCache {
                            request_id: request.id,
                            selection: selection.clone(),
                        });
                        (selection, false)
                    }
                    Err(Error::NoCandidate) if self.session.is_exhausted() => return self.exhausted(request),
                    Err(Error::NotLoggedIn(message)) => {
                        tracing::error!("Search rejected the credentials: {}", message);
                        self.fatal = true;
                        return self.stop(request, CycleOutcome::LoginRequired(message));
                    }
                    Err(e) if e.retryable() => {
                        tracing::error!(
                            "Giving up after {} retries, no further cycles will be started: {}",
                            self.options.retry_count,
                            e
                        );
                        self.fatal = true;
                        return self.stop(request, CycleOutcome::Failed(e.to_string()));
                    }
                    Err(e) => {
                        tracing::error!("Search failed, no further cycles will be started: {}", e);
                        self.fatal = true;
                        return self.stop(request, CycleOutcome::Failed(e.to_string()));
                    }
                }
            }
        };

        // 3. Init image, only when the host needs one
        let image = if request.mode.needs_init_image() {
            self.state = CycleState::ValidatingImage;
            match self.load_image(&selection).await {
                Ok(image) => Some(image),
                Err(e) => {
                    tracing::warn!("Invalid image for post {}, skipping this request: {}", selection.post_id, e);
                    self.session.register(selection.post_id);
                    self.cache = None;
                    self.state = CycleState::Done;
                    if self.session.is_exhausted() {
                        tracing::info!("All {} matching posts have been used", self.session.len());
                        request.stop_after_current();
                    }
                    return CycleOutcome::ImageRejected {
                        post_id: selection.post_id,
                    };
                }
            }
        } else {
            None
        };

        // 4. Apply
        self.state = CycleState::Applying;
        self.apply(request, &selection, image, &input.include);
        if self.session.is_exhausted() {
            tracing::info!("All {} matching posts have been used", self.session.len());
            request.stop_after_current();
        }
        self.state = CycleState::Done;
        CycleOutcome::Applied {
            post_id: selection.post_id,
            cached,
        }
    }

    /// One-off fetch for display, without the retry ladder. Shares the session with auto mode.
    pub async fn randomize(&mut self, include: &str, exclude: &str) -> Result<Preview> {
        if !self.source.has_credential() {
            return Err(Error::NotLoggedIn(LOGIN_MESSAGE.to_string()));
        }
        let constraints = self.constraints_for(include, exclude);
        self.check_constraints(&constraints);
        let selection = self.fetch_once(&constraints).await?;
        let tags = filter_tags(&selection.tags, &self.exclusion.load(false));
        Ok(Preview {
            tags: display_tags(&tags, &self.options),
            image_url: selection.image_url,
            post_url: selection.post_url,
        })
    }
}

impl<S: PostSource, F: ImageFetcher> AutoCycleController<S, F> {
    fn constraints_for(&self, include: &str, exclude: &str) -> SearchConstraints {
        SearchConstraints::parse(include, exclude).with_filters(&self.options.extra_filters)
    }

    fn check_constraints(&mut self, constraints: &SearchConstraints) {
        if self.constraints.as_ref() == Some(constraints) {
            return;
        }
        if let Some(previous) = &self.constraints {
            tracing::info!(
                "Search constraints changed from {:?} -{:?} to {:?} -{:?}, starting a new session",
                previous.include,
                previous.exclude,
                constraints.include,
                constraints.exclude
            );
        }
        self.session.reset();
        self.cache = None;
        self.fatal = false;
        self.constraints = Some(constraints.clone());
    }

    fn cached_selection(&self, request_id: u64) -> Option<Selection> {
        self.cache
            .as_ref()
            .filter(|cache| cache.request_id == request_id)
            .map(|cache| cache.selection.clone())
    }

    fn stop(&mut self, request: &mut GenerationRequest, outcome: CycleOutcome) -> CycleOutcome {
        self.state = CycleState::FatalStopped;
        request.stop_after_current();
        outcome
    }

    fn exhausted(&mut self, request: &mut GenerationRequest) -> CycleOutcome {
        tracing::info!("No unused posts left for the current tags ({} used)", self.session.len());
        self.state = CycleState::Done;
        request.stop_after_current();
        CycleOutcome::Exhausted
    }

    /// Fetch with up to `retry_count` retries, each after `retry_delay_ms`.
    /// Stops early on errors that cannot improve: bad credentials or an exhausted pool.
    /// A plain loop rather than `RetryIf::spawn`, since the session must stay mutable between attempts.
    async fn fetch_with_retry(&mut self, constraints: &SearchConstraints) -> Result<Selection> {
        let mut delays = FixedInterval::from_millis(self.options.retry_delay_ms).take(self.options.retry_count);
        let mut attempt = 0;
        loop {
            let err = match self.fetch_once(constraints).await {
                Ok(selection) => return Ok(selection),
                Err(e) => e,
            };
            let exhausted = matches!(err, Error::NoCandidate) && self.session.is_exhausted();
            if !err.retryable() || exhausted {
                return Err(err);
            }
            let Some(delay) = delays.next() else {
                return Err(err);
            };
            attempt += 1;
            tracing::warn!(
                "Fetch failed ({}), retry {}/{} in {} ms",
                err,
                attempt,
                self.options.retry_count,
                delay.as_millis()
            );
            tokio::time::sleep(delay).await;
        }
    }

    async fn fetch_once(&mut self, constraints: &SearchConstraints) -> Result<Selection> {
        let page = util::timeout(
            self.options.search_timeout_ms,
            self.source.search(constraints, self.options.search_limit),
        )
        .await?;
        self.session.set_total_count(page.total_count);
        let exclusion = self.exclusion.load(false);
        select(&page.posts, &mut self.session, &exclusion, &self.fetcher)
            .await
            .ok_or(Error::NoCandidate)
    }

    async fn load_image(&self, selection: &Selection) -> Result<RgbImage> {
        let fetched = self.fetcher.fetch(&selection.image_url).await?;
        Ok(randomizer_download::decode_rgb(&fetched)?)
    }

    fn apply(&mut self, request: &mut GenerationRequest, selection: &Selection, image: Option<RgbImage>, include: &str) {
        let tags = filter_tags(&selection.tags, &self.exclusion.load(false));
        request.prompt = append_prompt(&request.prompt, &display_tags(&tags, &self.options));

        if let Some(image) = image {
            let (width, height) = fit(image.width(), image.height(), &self.options.fit);
            tracing::info!(
                "Init image {}x{} from post {}, generating at {}x{}",
                image.width(),
                image.height(),
                selection.post_id,
                width,
                height
            );
            request.width = width;
            request.height = height;
            request.init_images = vec![image];
        }

        if !include.trim().is_empty() {
            request.set_param_once(INCLUDE_TAGS_KEY, include);
        }
        request.set_param_once(POST_URL_KEY, &selection.post_url);
    }
}
