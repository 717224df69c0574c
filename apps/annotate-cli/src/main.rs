//! pdf-annotate binary
//!
//! Drives the same controller as the browser viewer, with a file-backed
//! store and a directory in place of the download prompt.

mod cli;
mod hosts;

use annotate_core::{
    decode_storage_key, derive_storage_key_with, AnnotateConfig, FileStore, Hosts, NoteDraft,
    UiController,
};
use anyhow::{bail, Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use hosts::{DirectoryDownloads, LoggedControls, StderrNotifier};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_STORE_DIR: &str = ".pdf-annotations";

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<ExitCode> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // stdout carries command output; logs go to stderr
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    Ok(if run(cli).await? {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Execute one command. `Ok(false)` means the failure was already shown
/// to the user.
async fn run(cli: Cli) -> Result<bool> {
    let mut config = match &cli.config {
        Some(path) => AnnotateConfig::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => AnnotateConfig::default(),
    };
    if let Some(dir) = cli.store_dir {
        config.store_dir = Some(dir);
    }

    match cli.command {
        Commands::Note { file, page, text } => {
            let mut controller = open(&file, config, Path::new(".")).await?;
            let handle = controller
                .session()
                .document()
                .context("document not loaded")?
                .get_page(page)?;
            controller.set_current_page(handle);

            let draft = NoteDraft {
                text: text.unwrap_or_else(|| controller.config().note_text.clone()),
                rect: controller.config().note_rect,
            };
            let note = controller.add_note(draft).await?;
            println!("{}", note.id);
        }
        Commands::List { file, json } => {
            let controller = open(&file, config, Path::new(".")).await?;
            let table = controller
                .session()
                .document()
                .context("document not loaded")?
                .annotation_table();

            if json {
                println!("{}", serde_json::to_string_pretty(&table.to_map())?);
            } else {
                let mut notes: Vec<_> = table.iter().collect();
                notes.sort_by_key(|n| (n.page_number, n.timestamp));
                for note in notes {
                    println!("{}\t{}\t{}", note.page_number, note.id, note.text);
                }
            }
        }
        Commands::Export { file, out } => {
            let controller = open(&file, config, &out).await?;
            // The notifier has already printed any failure.
            return Ok(controller.save_annotated_pdf().await.is_ok());
        }
        Commands::Key { location, decode } => {
            if decode {
                match decode_storage_key(&config.key_prefix, &location) {
                    Some(decoded) => println!("{}", decoded),
                    None => bail!("not a storage key: {}", location),
                }
            } else {
                println!("{}", derive_storage_key_with(&config.key_prefix, &location));
            }
        }
    }

    Ok(true)
}

/// Load a PDF into a fresh controller and restore its stored notes.
async fn open(file: &Path, config: AnnotateConfig, out_dir: &Path) -> Result<UiController<FileStore>> {
    let bytes = tokio::fs::read(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let location = file_location(file)?;

    let store_dir = config
        .store_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_STORE_DIR));
    let hosts = Hosts {
        controls: Box::new(LoggedControls),
        notifier: Box::new(StderrNotifier),
        downloads: Box::new(DirectoryDownloads::new(out_dir)),
    };
    let mut controller = UiController::new(config, FileStore::new(store_dir), hosts);

    let doc = annotate_core::PdfDocument::load(&location, &bytes)
        .with_context(|| format!("Failed to parse {}", file.display()))?;
    controller.set_pdf_document(doc).await;
    Ok(controller)
}

/// `file://` URL of the canonical path, so one file always maps to one key.
/// Each segment is percent-encoded; a `%` in a file name stays literal.
fn file_location(file: &Path) -> Result<String> {
    let path = std::fs::canonicalize(file)
        .with_context(|| format!("Failed to resolve {}", file.display()))?;
    let encoded: Vec<String> = path
        .to_string_lossy()
        .split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect();
    Ok(format!("file://{}", encoded.join("/")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use annotate_core::{annotated_filename, export::ANNOTATED_SUFFIX, export::FALLBACK_FILENAME};
    use lopdf::{dictionary, Document, Object};
    use pretty_assertions::assert_eq;
    use std::ffi::OsStr;

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("pdf-annotate-main-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn create_test_pdf(path: &Path) {
        let mut doc = Document::with_version("1.7");
        let pages_id = doc.new_object_id();
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => Object::Reference(pages_id),
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![Object::Reference(page_id)],
                "Count" => 1,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => Object::Reference(pages_id),
        });
        doc.trailer.set("Root", Object::Reference(catalog_id));
        doc.save(path).unwrap();
    }

    #[test]
    fn test_percent_in_file_name_survives_export_naming() {
        let dir = temp_dir();
        let file = dir.join("a%20b.pdf");
        std::fs::write(&file, b"").unwrap();

        let location = file_location(&file).unwrap();
        assert!(location.starts_with("file:///"));
        assert!(location.ends_with("/a%2520b.pdf"));
        assert_eq!(
            annotated_filename(&location, ANNOTATED_SUFFIX, FALLBACK_FILENAME),
            "a%20b_annotated.pdf"
        );

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_failed_export_is_reported_once() {
        let dir = temp_dir();
        let pdf = dir.join("paper.pdf");
        create_test_pdf(&pdf);
        // A regular file where the output directory should be
        let out = dir.join("not-a-dir");
        std::fs::write(&out, b"").unwrap();

        let cli = Cli::parse_from([
            OsStr::new("pdf-annotate"),
            OsStr::new("export"),
            pdf.as_os_str(),
            OsStr::new("--out"),
            out.as_os_str(),
            OsStr::new("--store-dir"),
            dir.join("store").as_os_str(),
        ]);
        // Ok(false): already shown by the notifier, not returned as an error
        assert!(!run(cli).await.unwrap());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_note_then_export_succeeds() {
        let dir = temp_dir();
        let pdf = dir.join("paper.pdf");
        create_test_pdf(&pdf);
        let store = dir.join("store");

        let note = Cli::parse_from([
            OsStr::new("pdf-annotate"),
            OsStr::new("note"),
            pdf.as_os_str(),
            OsStr::new("--text"),
            OsStr::new("check this"),
            OsStr::new("--store-dir"),
            store.as_os_str(),
        ]);
        assert!(run(note).await.unwrap());

        let out = dir.join("out");
        let export = Cli::parse_from([
            OsStr::new("pdf-annotate"),
            OsStr::new("export"),
            pdf.as_os_str(),
            OsStr::new("--out"),
            out.as_os_str(),
            OsStr::new("--store-dir"),
            store.as_os_str(),
        ]);
        assert!(run(export).await.unwrap());
        assert!(out.join("paper_annotated.pdf").exists());

        std::fs::remove_dir_all(&dir).ok();
    }
}
