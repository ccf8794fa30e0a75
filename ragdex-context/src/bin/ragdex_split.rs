use clap::Parser;
use ragdex_context::text::{Language, SplitterConfig, TextSplitter};
use serde::Serialize;
use std::fs;
use std::io::{self, Read};
use std::path::Path;

/// A CLI tool to split a document into chunks and print them as JSON.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the input file. If not provided, reads from stdin.
    #[arg(short, long)]
    input: Option<String>,

    /// Source identifier recorded on every chunk.
    #[arg(short, long, default_value = "stdin")]
    source: String,

    /// Maximum number of characters per chunk.
    #[arg(short = 'c', long, default_value_t = 3000)]
    chunk_size: usize,

    /// Characters repeated from the end of one chunk at the start of the next.
    #[arg(short = 'o', long, default_value_t = 300)]
    chunk_overlap: usize,

    /// Split as source code of this language (ts, js, rs, py, go).
    /// Guessed from the input extension when omitted. Markdown and unknown
    /// files are split as prose, as the index build does.
    #[arg(short, long)]
    language: Option<String>,

    /// Separator for prose mode.
    #[arg(long, default_value = "\n\n")]
    separator: String,
}

#[derive(Serialize)]
struct SerializableChunk<'a> {
    source: &'a str,
    sequence: usize,
    start: usize,
    overlap: usize,
    text: &'a str,
}

fn main() -> io::Result<()> {
    let args = Args::parse();

    let (file_content, source) = if let Some(input_path) = &args.input {
        (fs::read_to_string(input_path)?, input_path.clone())
    } else {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        (buffer, args.source.clone())
    };

    let language = match &args.language {
        Some(name) => Some(Language::from_name(name).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("unknown language: {name}"),
            )
        })?),
        None => args
            .input
            .as_deref()
            .and_then(|p| Language::from_path(Path::new(p))),
    };

    let config = SplitterConfig::for_language(language, args.chunk_size, args.chunk_overlap)
        .with_separator(args.separator.clone());

    let splitter = TextSplitter::new(config)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e.to_string()))?;
    let chunks = splitter.split(&source, &file_content);

    let serializable_chunks: Vec<SerializableChunk> = chunks
        .iter()
        .map(|c| SerializableChunk {
            source: &c.source_path,
            sequence: c.sequence_index,
            start: c.start,
            overlap: c.overlap,
            text: &c.text,
        })
        .collect();

    let json_output = serde_json::to_string_pretty(&serializable_chunks)?;
    println!("{json_output}");

    Ok(())
}
