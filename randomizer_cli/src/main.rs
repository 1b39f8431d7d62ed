mod config;

use std::io::Read;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use dotenvy::dotenv;
use tracing_subscriber::filter::{EnvFilter, LevelFilter};

use gelbooru_client::GelbooruClient;
use randomizer_core::{
    AutoCycleController, CycleInput, CycleOutcome, ExclusionStore, GenerationRequest, ProcessingMode,
    RandomizerOptions,
};
use randomizer_download::{DownloaderOptions, ImageDownloader};

type Controller = AutoCycleController<GelbooruClient, ImageDownloader>;

#[derive(Parser, Debug)]
#[command(name = "gelbooru-randomizer", about = "Random Gelbooru tags for generation prompts")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Fetch one random post and print its tags.
    Randomize(TagArgs),
    /// Drive a batch of generation requests through the auto-cycle controller.
    Run(RunArgs),
    /// Print a single post.
    Post { id: u64 },
    /// Show or edit the exclusion list.
    #[command(subcommand)]
    Exclusions(ExclusionCommands),
}

#[derive(Args, Debug)]
struct TagArgs {
    /// Comma separated tags, `{a|b}` picks one alternative.
    #[arg(short, long, default_value = "")]
    include: String,
    #[arg(short, long, default_value = "")]
    exclude: String,
}

#[derive(Args, Debug)]
struct RunArgs {
    #[command(flatten)]
    tags: TagArgs,
    #[arg(short, long, default_value = "")]
    prompt: String,
    #[arg(short, long, default_value_t = 1)]
    batch_count: u32,
    /// Download the post image as init image and fit the resolution to it.
    #[arg(long)]
    img2img: bool,
}

#[derive(Subcommand, Debug)]
enum ExclusionCommands {
    Show,
    /// Replace the list with the content of stdin.
    Save,
    Reload,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    // 1. Initialize logger
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::DEBUG.into())
        .from_env()?
        .add_directive("hyper::proto=info".parse()?)
        .add_directive("hyper::client=info".parse()?)
        .add_directive("reqwest=info".parse()?);
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    // 2. Load configuration
    let cli = Cli::parse();
    let options = config::load_options()?;
    let exclusion = ExclusionStore::new(config::exclusion_path());

    match cli.command {
        Commands::Randomize(args) => {
            let mut controller = controller(options, exclusion)?;
            let preview = controller.randomize(&args.include, &args.exclude).await?;
            println!("{}", serde_json::to_string_pretty(&preview)?);
        }
        Commands::Run(args) => {
            let mut controller = controller(options, exclusion)?;
            run(&mut controller, args).await;
        }
        Commands::Post { id } => {
            let client = client(&options)?;
            let post = client.get_post(id).await?;
            println!("{}", serde_json::to_string_pretty(&post)?);
        }
        Commands::Exclusions(command) => exclusions(exclusion, command)?,
    }
    Ok(())
}

fn client(options: &RandomizerOptions) -> Result<GelbooruClient> {
    GelbooruClient::new(Some(&options.base_url), options.credential()).context("cannot create Gelbooru client")
}

fn controller(options: RandomizerOptions, exclusion: ExclusionStore) -> Result<Controller> {
    let client = client(&options)?;
    let downloader = ImageDownloader::new(DownloaderOptions::default()).context("cannot create image downloader")?;
    Ok(AutoCycleController::new(client, downloader, exclusion, options))
}

/// Stand-in for the generation host: one request per batch, stopping early when asked to.
async fn run(controller: &mut Controller, args: RunArgs) {
    let mode = if args.img2img {
        ProcessingMode::ImageToImage
    } else {
        ProcessingMode::TextToImage
    };
    let input = CycleInput {
        enabled: true,
        include: args.tags.include,
        exclude: args.tags.exclude,
    };

    let mut remaining = args.batch_count;
    let mut id = 0;
    while remaining > 0 {
        id += 1;
        let mut request = GenerationRequest::new(id, args.prompt.as_str(), mode, remaining);
        let outcome = controller.before_process(&mut request, &input).await;
        match &outcome {
            CycleOutcome::Applied { post_id, cached } => {
                println!("#{} post {}{}", id, post_id, if *cached { " (cached)" } else { "" });
                println!("  prompt: {}", request.prompt);
                println!("  size: {}x{}", request.width, request.height);
                for (key, value) in &request.extra_generation_params {
                    println!("  {}: {}", key, value);
                }
            }
            CycleOutcome::LoginRequired(message) | CycleOutcome::Failed(message) => {
                eprintln!("#{} {}", id, message);
            }
            other => println!("#{} {:?}", id, other),
        }
        remaining = request.remaining_batches.saturating_sub(1);
    }
}

fn exclusions(mut store: ExclusionStore, command: ExclusionCommands) -> Result<()> {
    match command {
        ExclusionCommands::Show => print!("{}", store.read_text()),
        ExclusionCommands::Reload => {
            let text = store.reload();
            let count = store.load(false).len();
            tracing::info!("Reloaded {} excluded tags from {}", count, store.path().display());
            print!("{}", text);
        }
        ExclusionCommands::Save => {
            let mut text = String::new();
            std::io::stdin().read_to_string(&mut text)?;
            store.save(&text)?;
            tracing::info!("Saved exclusion list to {}", store.path().display());
        }
    }
    Ok(())
}
