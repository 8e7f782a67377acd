use anyhow::Result;
use gallery_feed::config::Config;
use gallery_feed::context::ServiceContext;
use gallery_feed::feed::store::FeedStore;
use gallery_feed::feed::Presenter;
use gallery_feed::service::memory::MemoryDataService;
use gallery_feed::service::rest::RestDataService;
use gallery_feed::service::DataService;
use gallery_feed::session::{GallerySession, UiEvent, UploadRequest};
use gallery_feed::upload::http::HttpUploader;
use gallery_feed::upload::memory::MemoryUploader;
use gallery_feed::upload::{SelectedFile, Uploader};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

/// Prints the active view to stdout on every layout request.
struct ConsolePresenter;

impl Presenter for ConsolePresenter {
    fn request_layout(&mut self, store: &FeedStore) {
        println!();
        println!("  Gallery: {} items (page {})", store.items().len(), store.cursor());
        if store.no_records() {
            println!("  No records found.");
        }
        for (i, item) in store.items().iter().enumerate() {
            let when = chrono::DateTime::from_timestamp_millis(item.date)
                .map(|dt| dt.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_default();
            let tags: Vec<String> = item.tags.iter().map(|t| format!("#{}", t)).collect();
            println!(
                "  {:>3}. {:<32} {:<24} {}  {}",
                i + 1,
                item.title,
                tags.join(" "),
                when,
                item.path
            );
        }
    }

    fn upload_progress(&mut self, percent: u8) {
        if percent >= 100 {
            println!("  Upload: Completed...");
        } else {
            println!("  Upload: {}%", percent);
        }
    }
}

/// One line of console input.
#[derive(Debug, PartialEq)]
enum Command {
    More,
    Quit,
    Upload { file: PathBuf, title: String, tags: Vec<String> },
    Query(String),
}

fn parse_command(line: &str) -> Option<Command> {
    let trimmed = line.trim();
    match trimmed {
        ":quit" | ":q" => return Some(Command::Quit),
        ":more" | ":m" => return Some(Command::More),
        _ => {}
    }
    if let Some(rest) = trimmed.strip_prefix(":upload") {
        let mut words = rest.split_whitespace();
        let file = PathBuf::from(words.next()?);
        let (tags, title): (Vec<&str>, Vec<&str>) = words.partition(|w| w.starts_with('#'));
        return Some(Command::Upload {
            file,
            title: title.join(" "),
            tags: tags.iter().map(|t| t.trim_start_matches('#').to_string()).collect(),
        });
    }
    Some(Command::Query(line.trim_end_matches(['\n', '\r']).to_string()))
}

async fn read_commands(tx: mpsc::Sender<UiEvent>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                tracing::error!("stdin read failed: {:#}", e);
                break;
            }
        };
        let event = match parse_command(&line) {
            Some(Command::Quit) => break,
            Some(Command::More) => UiEvent::NearScrollEnd,
            Some(Command::Query(text)) => UiEvent::QueryChanged(text),
            Some(Command::Upload { file, title, tags }) => match SelectedFile::read(&file).await {
                Ok(file) => UiEvent::Upload(UploadRequest { file, title, tags }),
                Err(e) => {
                    println!("  {:#}", e);
                    continue;
                }
            },
            None => {
                println!("  usage: :upload <file> <title...> [#tag ...]");
                continue;
            }
        };
        if tx.send(event).await.is_err() {
            return;
        }
    }
    let _ = tx.send(UiEvent::Quit).await;
}

#[tokio::main]
async fn main() -> Result<()> {
    let log_file = std::fs::File::create("gallery-feed.log")?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("gallery_feed=info")),
        )
        .with_writer(log_file)
        .with_ansi(false)
        .init();

    let args: Vec<String> = std::env::args().collect();
    let offline = args.iter().any(|arg| arg == "--offline");
    let config_path = args
        .windows(2)
        .find(|w| w[0] == "--config")
        .map(|w| PathBuf::from(&w[1]))
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    let config = Config::load(Path::new(&config_path))?;
    Config::load_env_file();

    println!();
    println!("  Gallery Feed v0.1.0");
    println!("  ===================");
    if offline {
        println!("  ** OFFLINE MODE ** (in-memory database and storage)");
    }
    println!("  :more loads the next page, :upload <file> <title> [#tag ...] adds an image,");
    println!("  :quit exits. Anything else searches titles and tags.");

    let (data, uploader): (Arc<dyn DataService>, Arc<dyn Uploader>) = if offline {
        (
            Arc::new(MemoryDataService::new()),
            Arc::new(MemoryUploader::new("memory://gallery")),
        )
    } else {
        (
            Arc::new(RestDataService::new(&config.database, Config::database_auth())?),
            Arc::new(HttpUploader::new(&config.storage, Config::upload_token())?),
        )
    };

    tracing::info!(offline, collection = %config.database.collection, "starting session");
    let ctx = ServiceContext::new(data, uploader, config);

    let (tx, rx) = mpsc::channel(32);
    tokio::spawn(read_commands(tx));

    GallerySession::new(ctx, ConsolePresenter).run(rx).await
}
