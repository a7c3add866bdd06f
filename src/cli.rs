//! CLI interface for semvec
//!
//! Provides command-line interface for:
//! - Building a semantic space from a directory of text files
//! - Querying the nearest neighbours of a word in a saved space

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand, ValueEnum};
use parking_lot::Mutex;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

use crate::config::{PermutationKind, RefinementMode, RiConfig, SemanticEncoding, SenseConfig};
use crate::engine::RandomIndexing;
use crate::space::{SemanticSpace, Space};
use crate::vsa::generator::IndexVectorMap;

#[derive(Parser)]
#[command(name = "semvec")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Random Indexing word spaces from plain text")]
#[command(
    long_about = "semvec - Random Indexing semantic spaces\n\n\
    semvec assigns every word a sparse random index vector and sums the index vectors\n\
    of the words around each occurrence into that word's semantic vector.\n\n\
    Modes:\n\
    • plain: one pass, co-occurrence vectors\n\
    • reflective: a second pass sums document vectors per term\n\
    • senses: contexts of each term are clustered into word senses\n\n\
    Examples:\n\
      semvec build -i ./corpus -o space.json -v\n\
      semvec build -i ./corpus -o space.json --mode reflective --permutation shuffle\n\
      semvec query -s space.json -w bank -k 10"
)]
#[command(author = "semvec Contributors")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build a semantic space from a directory of text files
    #[command(
        long_about = "Build a semantic space from a directory of text files\n\n\
        Every regular file under the input directory is one document. Text is lower-cased\n\
        and split on anything that is not a letter or digit; stop words keep their\n\
        position but are not indexed. Files are processed on several threads.\n\n\
        Example:\n\
          semvec build -i ./corpus -o space.json --length 2000 --window 3 -v\n\
          semvec build -i ./corpus -o senses.json --mode senses --stop-words stop.txt"
    )]
    Build(BuildArgs),

    /// Print the nearest neighbours of a word in a saved space
    #[command(
        long_about = "Print the nearest neighbours of a word in a saved space\n\n\
        Loads a space written by `semvec build` and ranks every other word by cosine\n\
        similarity to the query word.\n\n\
        Example:\n\
          semvec query -s space.json -w river -k 5"
    )]
    Query(QueryArgs),
}

#[derive(Args, Debug, Clone)]
pub struct BuildArgs {
    /// Input directory (recursively processes all files)
    #[arg(short, long, value_name = "DIR", help_heading = "Required")]
    pub input: PathBuf,

    /// Output file for the semantic space (JSON)
    #[arg(short, long, default_value = "space.json", value_name = "FILE")]
    pub output: PathBuf,

    /// JSON engine configuration; flags below override it
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Index and semantic vector length
    #[arg(long, value_name = "N")]
    pub length: Option<usize>,

    /// Words on each side of the focus word
    #[arg(long, value_name = "N")]
    pub window: Option<usize>,

    /// Encode word order with a permutation (rotation or shuffle)
    #[arg(long, value_name = "KIND")]
    pub permutation: Option<PermutationKind>,

    /// Semantic vector storage (sparse or dense)
    #[arg(long, value_name = "KIND")]
    pub encoding: Option<SemanticEncoding>,

    /// Refinement after the first pass
    #[arg(long, value_enum)]
    pub mode: Option<ModeArg>,

    /// Seed for every random draw
    #[arg(long, value_name = "SEED")]
    pub seed: Option<u64>,

    /// Worker threads for both passes
    #[arg(short, long, value_name = "N")]
    pub threads: Option<usize>,

    /// Stop word list, one word per line
    #[arg(long, value_name = "FILE")]
    pub stop_words: Option<PathBuf>,

    /// Only build vectors for the words in this list
    #[arg(long, value_name = "FILE")]
    pub filter: Option<PathBuf>,

    /// Reuse index vectors saved by an earlier build
    #[arg(long, value_name = "FILE")]
    pub load_index: Option<PathBuf>,

    /// Save the index vectors for later builds
    #[arg(long, value_name = "FILE")]
    pub save_index: Option<PathBuf>,

    /// Enable verbose output showing progress and statistics
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(Args, Debug, Clone)]
pub struct QueryArgs {
    /// Semantic space written by `semvec build`
    #[arg(short, long, default_value = "space.json", value_name = "FILE")]
    pub space: PathBuf,

    /// Word to look up
    #[arg(short, long, help_heading = "Required")]
    pub word: String,

    /// Number of neighbours to print
    #[arg(short, long, default_value_t = 10)]
    pub k: usize,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    Plain,
    Reflective,
    Senses,
}

pub fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Build(args) => {
            init_logging(args.verbose);
            if args.verbose {
                println!("semvec v{} - Build", env!("CARGO_PKG_VERSION"));
                println!("=====================");
            }

            let space = build(&args)?;
            space.save_json(&args.output)
                .with_context(|| format!("writing {}", args.output.display()))?;

            if args.verbose {
                println!("\nBuild complete!");
                println!("  Space: {}", space.space_name());
                println!("  Output: {}", args.output.display());
                println!("  Words: {}", space.len());
                println!("  Dimensions: {}", space.vector_length());
            }
            Ok(())
        }

        Commands::Query(args) => {
            init_logging(args.verbose);
            let space = Space::load_json(&args.space)
                .with_context(|| format!("reading {}", args.space.display()))?;
            if args.verbose {
                println!("Space: {} ({} words)", space.space_name(), space.len());
            }

            let Some(neighbours) = space.nearest(&args.word, args.k) else {
                bail!("'{}' is not in {}", args.word, args.space.display());
            };
            println!("Nearest to '{}':", args.word);
            for (word, similarity) in neighbours {
                println!("  {:<24} {:.4}", word, similarity);
            }
            Ok(())
        }
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "semvec=info" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    // A second init in the same process (tests) is harmless
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Resolve the engine configuration: the JSON file if given, then flags.
pub fn build_config(args: &BuildArgs) -> anyhow::Result<RiConfig> {
    let mut config = match &args.config {
        Some(path) => RiConfig::from_json_file(path)
            .with_context(|| format!("loading configuration {}", path.display()))?,
        None => RiConfig::default(),
    };
    if let Some(length) = args.length {
        config.vector_length = length;
    }
    if let Some(window) = args.window {
        config.window_size = window;
    }
    if let Some(kind) = args.permutation {
        config = config.with_permutations(kind);
    }
    if let Some(encoding) = args.encoding {
        config.encoding = encoding;
    }
    if let Some(seed) = args.seed {
        config = config.with_seed(seed);
    }
    if let Some(threads) = args.threads {
        config.workers = threads;
    }
    config.mode = match (args.mode, config.mode) {
        (None, mode) => mode,
        (Some(ModeArg::Plain), _) => RefinementMode::Plain,
        (Some(ModeArg::Reflective), _) => RefinementMode::Reflective,
        (Some(ModeArg::Senses), RefinementMode::Senses(senses)) => RefinementMode::Senses(senses),
        (Some(ModeArg::Senses), _) => RefinementMode::Senses(SenseConfig::default()),
    };
    config.validate()?;
    Ok(config)
}

/// Lower-case `text` and split it on anything that is not alphanumeric.
/// Stop words become empty tokens so they still occupy a window position.
pub fn tokenize(text: &str, stop_words: &HashSet<String>) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| {
            let token = t.to_lowercase();
            if stop_words.contains(&token) {
                String::new()
            } else {
                token
            }
        })
        .collect()
}

/// One word per line; blank lines and `#` comments are skipped.
pub fn read_word_list(path: &Path) -> anyhow::Result<HashSet<String>> {
    let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(str::to_lowercase)
        .collect())
}

/// Every regular file under `dir`, sorted.
pub fn collect_documents(dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).follow_links(false) {
        let entry = entry?;
        if entry.file_type().is_file() {
            files.push(entry.path().to_path_buf());
        }
    }
    files.sort();
    Ok(files)
}

/// Run a whole build: walk, tokenize, accumulate on `workers` threads, finalize.
pub fn build(args: &BuildArgs) -> anyhow::Result<Space> {
    let config = build_config(args)?;
    let workers = config.workers;
    let stop_words = match &args.stop_words {
        Some(path) => read_word_list(path)?,
        None => HashSet::new(),
    };

    let mut engine = RandomIndexing::new(config)?;
    if let Some(path) = &args.filter {
        engine.set_semantic_filter(read_word_list(path)?);
    }
    if let Some(path) = &args.load_index {
        let vectors = IndexVectorMap::load(path)
            .with_context(|| format!("loading index vectors {}", path.display()))?;
        engine.set_index_vectors(vectors)?;
    }

    let files = collect_documents(&args.input)?;
    if files.is_empty() {
        warn!(input = %args.input.display(), "no documents found");
    }
    info!(documents = files.len(), workers, "building semantic space");

    let next = AtomicUsize::new(0);
    let failure: Mutex<Option<anyhow::Error>> = Mutex::new(None);
    thread::scope(|scope| {
        for _ in 0..workers {
            scope.spawn(|| loop {
                if failure.lock().is_some() {
                    break;
                }
                let i = next.fetch_add(1, Ordering::Relaxed);
                let Some(path) = files.get(i) else {
                    break;
                };
                if let Err(e) = process_file(&engine, path, &stop_words) {
                    failure.lock().get_or_insert(e);
                    break;
                }
            });
        }
    });
    if let Some(e) = failure.into_inner() {
        return Err(e);
    }

    if let Some(path) = &args.save_index {
        engine
            .save_index_vectors(path)
            .with_context(|| format!("saving index vectors {}", path.display()))?;
    }
    if args.verbose {
        println!("Documents: {}", engine.document_count());
        println!("Terms: {}", engine.term_count());
    }
    Ok(engine.finalize()?)
}

fn process_file(
    engine: &RandomIndexing,
    path: &Path,
    stop_words: &HashSet<String>,
) -> anyhow::Result<()> {
    let bytes = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let tokens = tokenize(&String::from_utf8_lossy(&bytes), stop_words);
    debug!(path = %path.display(), tokens = tokens.len(), "tokenized document");
    engine
        .process_document(&tokens)
        .with_context(|| format!("processing {}", path.display()))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn args(input: &Path) -> BuildArgs {
        BuildArgs {
            input: input.to_path_buf(),
            output: input.join("space.json"),
            config: None,
            length: Some(256),
            window: Some(1),
            permutation: None,
            encoding: None,
            mode: None,
            seed: Some(5),
            threads: Some(2),
            stop_words: None,
            filter: None,
            load_index: None,
            save_index: None,
            verbose: false,
        }
    }

    #[test]
    fn test_tokenize_lowercases_and_keeps_stop_word_positions() {
        let stop: HashSet<String> = ["the".to_string()].into_iter().collect();
        let tokens = tokenize("The cat, the HAT!\n42x", &stop);
        assert_eq!(tokens, vec!["", "cat", "", "hat", "42x"]);
    }

    #[test]
    fn test_cli_parses_build_flags() {
        let cli = Cli::try_parse_from([
            "semvec",
            "build",
            "-i",
            "corpus",
            "--mode",
            "senses",
            "--permutation",
            "shuffle",
            "--window",
            "3",
        ])
        .unwrap();
        let Commands::Build(args) = cli.command else {
            panic!("expected build");
        };
        assert_eq!(args.mode, Some(ModeArg::Senses));
        assert_eq!(args.permutation, Some(PermutationKind::Shuffle));
        let config = build_config(&args).unwrap();
        assert_eq!(config.window_size, 3);
        assert!(config.use_permutations);
        assert!(matches!(config.mode, RefinementMode::Senses(_)));
    }

    #[test]
    fn test_flags_override_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            r#"{ "vector_length": 1000, "window_size": 4, "mode": "reflective" }"#,
        )
        .unwrap();
        let mut a = args(dir.path());
        a.config = Some(path);
        a.length = None;
        let config = build_config(&a).unwrap();
        assert_eq!(config.vector_length, 1000);
        assert_eq!(config.window_size, 1);
        assert_eq!(config.mode, RefinementMode::Reflective);
    }

    #[test]
    fn test_invalid_flags_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut a = args(dir.path());
        a.window = Some(0);
        assert!(build_config(&a).is_err());
    }

    #[test]
    fn test_build_directory_and_share_index_vectors() {
        let dir = tempfile::tempdir().unwrap();
        let corpus = dir.path().join("corpus");
        fs::create_dir_all(corpus.join("nested")).unwrap();
        fs::write(corpus.join("a.txt"), "the river bank flooded").unwrap();
        fs::write(corpus.join("nested/b.txt"), "the bank raised interest rates").unwrap();
        fs::write(dir.path().join("stop.txt"), "# stop words\nthe\n").unwrap();

        let mut a = args(&corpus);
        a.stop_words = Some(dir.path().join("stop.txt"));
        a.save_index = Some(dir.path().join("index.bin"));
        let first = build(&a).unwrap();
        assert!(first.get("bank").is_some());
        assert!(first.get("the").is_none());

        let mut b = args(&corpus);
        b.seed = Some(99);
        b.stop_words = a.stop_words.clone();
        b.load_index = a.save_index.clone();
        let second = build(&b).unwrap();
        assert_eq!(first.get("bank"), second.get("bank"));
    }
}
