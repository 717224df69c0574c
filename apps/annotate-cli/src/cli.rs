use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Keep notes on PDF files and export annotated copies.
#[derive(Debug, Parser)]
#[command(name = "pdf-annotate", about, version)]
pub struct Cli {
    /// TOML configuration file
    #[arg(long, global = true, env = "PDF_ANNOTATE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Directory holding persisted annotations (overrides the config file)
    #[arg(long, global = true, env = "PDF_ANNOTATE_STORE")]
    pub store_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Add a text note to a page
    Note {
        /// Path to the PDF file
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// 1-based page number
        #[arg(long, default_value_t = 1)]
        page: u32,

        /// Note text (defaults to the configured note text)
        #[arg(long)]
        text: Option<String>,
    },

    /// List the notes stored for a PDF
    List {
        /// Path to the PDF file
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Print the stored map as JSON
        #[arg(long)]
        json: bool,
    },

    /// Write a copy of the PDF with every stored note embedded
    Export {
        /// Path to the PDF file
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Output directory (defaults to the current directory)
        #[arg(long, value_name = "DIR", default_value = ".")]
        out: PathBuf,
    },

    /// Print the storage key of a document location
    Key {
        /// Document location, e.g. a file:// or https:// URL
        location: String,

        /// Treat the argument as a key and print its location
        #[arg(long)]
        decode: bool,
    },
}
