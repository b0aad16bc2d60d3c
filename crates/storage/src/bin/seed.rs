use std::fmt;

use crosspoint_core::Clock;
use crosspoint_core::QuizBank;
use crosspoint_core::model::{Category, QuestionStatus, UserId};
use storage::repository::{NewQuestionRecord, Storage, VerificationPatch};
use storage::{Namespace, NamespaceError};

#[derive(Debug, Clone)]
struct Args {
    db_url: String,
    namespace: Namespace,
    author: UserId,
    questions: u32,
    verify: Vec<Category>,
}

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    InvalidDbUrl { raw: String },
    InvalidNamespace(NamespaceError),
    InvalidAuthor { raw: String },
    InvalidQuestions { raw: String },
    UnknownCategory { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
            ArgsError::InvalidNamespace(err) => write!(f, "invalid --namespace value: {err}"),
            ArgsError::InvalidAuthor { raw } => write!(f, "invalid --author value: {raw:?}"),
            ArgsError::InvalidQuestions { raw } => write!(f, "invalid --questions value: {raw}"),
            ArgsError::UnknownCategory { raw } => {
                write!(f, "invalid --verify value (no quiz for category): {raw}")
            }
        }
    }
}

impl std::error::Error for ArgsError {}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

impl Args {
    fn parse(bank: &QuizBank) -> Result<Self, ArgsError> {
        let mut db_url = std::env::var("CROSSPOINT_DB_URL")
            .unwrap_or_else(|_| "sqlite://crosspoint.sqlite3?mode=rwc".into());
        let mut namespace = std::env::var("CROSSPOINT_NAMESPACE")
            .ok()
            .map_or_else(|| Ok(Namespace::default()), Namespace::new)
            .map_err(ArgsError::InvalidNamespace)?;
        let mut author = UserId::new("seed-author").map_err(|_| ArgsError::InvalidAuthor {
            raw: "seed-author".into(),
        })?;
        let mut questions = 5;
        let mut verify = Vec::new();

        let mut args = std::env::args().skip(1);
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(&mut args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = value;
                }
                "--namespace" => {
                    let value = require_value(&mut args, "--namespace")?;
                    namespace = Namespace::new(value).map_err(ArgsError::InvalidNamespace)?;
                }
                "--author" => {
                    let value = require_value(&mut args, "--author")?;
                    author = UserId::new(value.clone())
                        .map_err(|_| ArgsError::InvalidAuthor { raw: value })?;
                }
                "--questions" => {
                    let value = require_value(&mut args, "--questions")?;
                    questions = value
                        .parse()
                        .map_err(|_| ArgsError::InvalidQuestions { raw: value.clone() })?;
                }
                "--verify" => {
                    let value = require_value(&mut args, "--verify")?;
                    let category = Category::new(value.clone())
                        .ok()
                        .filter(|c| bank.has_quiz(c))
                        .ok_or(ArgsError::UnknownCategory { raw: value })?;
                    verify.push(category);
                }
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        Ok(Self {
            db_url,
            namespace,
            author,
            questions,
            verify,
        })
    }
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!(
        "  cargo run -p storage --bin seed -- [--db <sqlite_url>] [--namespace <id>] \
         [--author <uid>] [--questions <n>] [--verify <category>]..."
    );
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  CROSSPOINT_DB_URL, CROSSPOINT_NAMESPACE");
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let bank = QuizBank::builtin();
    let args = Args::parse(&bank).inspect_err(|_| print_usage())?;
    let clock = Clock::system();
    let storage = Storage::sqlite(&args.db_url, args.namespace.clone(), clock).await?;

    let categories = bank.postable_categories();
    for i in 0..args.questions {
        let index = usize::try_from(i)?;
        let category = categories[index % categories.len()].clone();
        storage
            .questions
            .insert_question(NewQuestionRecord {
                title: format!("Seed question #{}", i + 1),
                body: format!("Sample question in {category} created by the seeder."),
                author_id: args.author.clone(),
                category,
                status: QuestionStatus::Open,
                created_at_ms: clock.now_millis(),
            })
            .await?;
    }

    if !args.verify.is_empty() {
        storage
            .verifications
            .merge_verification(VerificationPatch {
                user_id: args.author.clone(),
                display_name: None,
                add_categories: args.verify.clone(),
            })
            .await?;
    }

    eprintln!(
        "seeded {} question(s) and {} verification(s) into {} (namespace {})",
        args.questions,
        args.verify.len(),
        args.db_url,
        args.namespace
    );
    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}
