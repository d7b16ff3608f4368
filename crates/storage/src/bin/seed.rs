use std::fmt;

use study_core::model::{QuestionId, TopicId};
use storage::sqlite::SqliteRepository;

#[derive(Debug, Clone)]
struct Args {
    db_url: String,
    topics: u64,
    questions_per_topic: u64,
}

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    InvalidTopics { raw: String },
    InvalidQuestions { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidTopics { raw } => write!(f, "invalid --topics value: {raw}"),
            ArgsError::InvalidQuestions { raw } => {
                write!(f, "invalid --questions value: {raw}")
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
    fn parse() -> Result<Self, ArgsError> {
        let mut db_url =
            std::env::var("STUDY_DB_URL").unwrap_or_else(|_| "sqlite:dev.sqlite3".into());
        let mut topics = 3_u64;
        let mut questions_per_topic = 10_u64;

        let mut args = std::env::args().skip(1);
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => db_url = require_value(&mut args, "--db")?,
                "--topics" => {
                    let raw = require_value(&mut args, "--topics")?;
                    topics = raw
                        .parse()
                        .map_err(|_| ArgsError::InvalidTopics { raw })?;
                }
                "--questions" => {
                    let raw = require_value(&mut args, "--questions")?;
                    questions_per_topic = raw
                        .parse()
                        .map_err(|_| ArgsError::InvalidQuestions { raw })?;
                }
                other => return Err(ArgsError::UnknownArg(other.to_string())),
            }
        }

        Ok(Self {
            db_url,
            topics,
            questions_per_topic,
        })
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse()?;

    let repo = SqliteRepository::connect(&args.db_url).await?;
    repo.migrate().await?;

    let mut seeded = 0_u64;
    for topic in 1..=args.topics {
        for slot in 0..args.questions_per_topic {
            let question = (topic - 1) * args.questions_per_topic + slot + 1;
            repo.upsert_question(QuestionId::new(question), TopicId::new(topic))
                .await?;
            seeded += 1;
        }
    }

    println!(
        "Seeded {} questions across {} topics into {}",
        seeded, args.topics, args.db_url
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
