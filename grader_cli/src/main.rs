use base64::{engine::general_purpose, Engine};
use clap::{Parser, Subcommand};
use log::info;
use std::{fs, path::PathBuf};
use uuid::Uuid;

use grader_core::{
    callback::ResultView,
    config::GraderConfig,
    error::{Error, Result},
    store::{self, FsStore, SubmissionStore},
    submission::{Language, Submission},
    worker::stop_file,
};

#[derive(Parser)]
#[command(
    version = "0.1.0",
    name = "grader",
    author = "Kanari",
    about = "Operator tooling for Iron Grader."
)]
struct Opts {
    /// grader config (yaml)
    #[arg(short, long, global = true)]
    config: Option<String>,
    #[command(subcommand)]
    subcmd: SubCommand,
}

#[derive(Subcommand)]
enum SubCommand {
    /// Queue a submission for grading
    Enqueue(EnqueueConfig),
    /// Show a submission by id or token
    Show { key: String },
    /// List languages from a languages file
    Languages {
        #[arg(short, long, default_value = "languages.yaml")]
        languages: PathBuf,
    },
    /// Ask worker `pid` to stop after its current submission
    Stop { pid: u32 },
}

#[derive(clap::Args, Debug)]
struct EnqueueConfig {
    /// path of source code
    source: PathBuf,
    #[arg(short = 'L', long, default_value = "languages.yaml")]
    languages: PathBuf,
    /// language id
    #[arg(short, long)]
    language: u32,
    /// input file path
    #[arg(short, long)]
    input_file: Option<PathBuf>,
    /// expected output file path
    #[arg(short, long)]
    answer_file: Option<PathBuf>,
    #[arg(long)]
    compiler_options: Option<String>,
    #[arg(long)]
    args: Option<String>,
    /// zip archive extracted into the box
    #[arg(long)]
    additional_files: Option<PathBuf>,
    #[arg(long)]
    callback_url: Option<String>,
    /// seconds
    #[arg(short, long)]
    time_limit: Option<f64>,
    /// kilobytes
    #[arg(short, long)]
    memory_limit: Option<u64>,
    #[arg(long)]
    runs: Option<u32>,
}

fn load_languages(path: &PathBuf) -> Result<Vec<Language>> {
    let content = fs::read_to_string(path)?;
    Ok(serde_yaml::from_str(&content)?)
}

fn print_result(s: &Submission) -> Result<()> {
    println!("id: {}", s.id);
    println!("language: {}", s.language.name);
    print!("{}", serde_yaml::to_string(&ResultView::from(s))?);
    Ok(())
}

async fn enqueue(store: &dyn SubmissionStore, config: &GraderConfig, opts: EnqueueConfig) -> Result<()> {
    let language = load_languages(&opts.languages)?
        .into_iter()
        .find(|l| l.id == opts.language)
        .ok_or_else(|| Error::NotFound(format!("language {}", opts.language)))?;
    if language.is_archived {
        return Err(Error::Argument(format!("language {} is archived", language.name)));
    }

    let mut s = Submission::new(0, language, fs::read_to_string(&opts.source)?);
    s.stdin = opts.input_file.map(fs::read_to_string).transpose()?;
    s.expected_output = opts.answer_file.map(fs::read_to_string).transpose()?;
    s.compiler_options = opts.compiler_options;
    s.command_line_arguments = opts.args;
    s.callback_url = opts.callback_url;
    if let Some(path) = opts.additional_files {
        s.additional_files = Some(general_purpose::STANDARD.encode(fs::read(path)?));
    }
    s.limits.cpu_time_limit = opts.time_limit;
    s.limits.memory_limit = opts.memory_limit;
    s.limits.number_of_runs = opts.runs;

    let s = store::create(store, s, config).await?;
    info!("queued submission {}", s.id);
    println!("id: {}", s.id);
    println!("token: {}", s.token);
    Ok(())
}

async fn show(store: &dyn SubmissionStore, key: &str) -> Result<()> {
    let found = match key.parse::<u64>() {
        Ok(id) => store.find(id).await?,
        Err(_) => {
            let token = Uuid::parse_str(key)
                .map_err(|_| Error::Argument(format!("`{}` is neither an id nor a token", key)))?;
            store.find_by_token(&token).await?
        }
    };
    match found {
        Some(s) => print_result(&s),
        None => Err(Error::NotFound(format!("submission {}", key))),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let opts = Opts::parse();
    let config = match &opts.config {
        Some(path) => GraderConfig::from_file(path)?,
        None => GraderConfig::default(),
    };

    match opts.subcmd {
        SubCommand::Enqueue(enqueue_config) => {
            let store = FsStore::open(&config.store_dir)?;
            enqueue(&store, &config, enqueue_config).await
        }
        SubCommand::Show { key } => {
            let store = FsStore::open(&config.store_dir)?;
            show(&store, &key).await
        }
        SubCommand::Languages { languages } => {
            for l in load_languages(&languages)? {
                let archived = if l.is_archived { " (archived)" } else { "" };
                println!("{:>4}  {}{}", l.id, l.name, archived);
            }
            Ok(())
        }
        SubCommand::Stop { pid } => {
            let file = stop_file(&config.stop_dir, pid);
            fs::write(&file, "")?;
            println!("stop requested: {}", file.display());
            Ok(())
        }
    }
}
