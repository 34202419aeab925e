mod cli;
mod config;
mod photos;
mod storage;

use std::path::{Path, PathBuf};

use ballotbox_core::{CandidateSet, Collection, RecordStore, VoterRegistration};
use ballotbox_service::{tally, BallotStore, Tally};
use ballotbox_storage::{cipher::BallotCipher, key_provider::KeyProvider};
use chrono::NaiveDate;
use clap::Parser;
use color_eyre::Result;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::cli::{Command, ConfigCommand};

/// Entry point wiring the CLI to the ballot store.
#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    init_tracing();

    let cli = cli::Cli::parse();
    let config = match &cli.config {
        Some(path) => config::load_from_path(path)?,
        None => config::load()?,
    };

    match cli.command {
        Command::Register {
            voter_id,
            name,
            dob,
            photo,
        } => run_register(&config, voter_id, name, dob, photo).await?,
        Command::Vote {
            voter_id,
            candidate,
        } => {
            let store = storage::store_from_config(&config)?;
            store.cast(&voter_id, &candidate).await?;
            println!("Your vote has been successfully submitted.");
        }
        Command::Status { voter_id } => {
            let store = storage::store_from_config(&config)?;
            if store.has_voted(&voter_id).await? {
                println!("{voter_id} has already voted.");
            } else {
                println!("{voter_id} has not voted yet.");
            }
        }
        Command::Tally => {
            let store = storage::store_from_config(&config)?;
            print!("{}", render_results(&store).await?);
        }
        Command::Candidates => {
            for label in config.candidate_set()?.iter() {
                println!("{label}");
            }
        }
        Command::Voters => list_voters(&storage::store_from_config(&config)?).await?,
        Command::Health => run_health_check(&config).await?,
        Command::Version => print_version(),
        Command::Config(ConfigCommand::Init) => init_config(cli.config.as_deref())?,
    }

    Ok(())
}

fn init_tracing() {
    // Respect user-provided filters, default to info to avoid noisy stdout.
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer().with_target(false);
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

fn print_version() {
    println!("ballotbox {}", env!("CARGO_PKG_VERSION"));
}

async fn run_register(
    config: &config::Config,
    voter_id: Option<String>,
    name: Option<String>,
    dob: Option<NaiveDate>,
    photo: Option<PathBuf>,
) -> Result<()> {
    let store = storage::store_from_config(config)?;
    let voter_id = voter_id.unwrap_or_default();
    let staged = match &photo {
        Some(path) => Some(photos::stage_photo(
            &storage::photos_dir(config)?,
            &voter_id,
            path,
        )?),
        None => None,
    };

    let request = VoterRegistration {
        voter_id,
        name: name.unwrap_or_default(),
        date_of_birth: dob,
        photo_reference: staged.as_ref().map(|p| p.reference().to_string()),
    };
    // A failed registration drops the staged photo, which removes it.
    let voter = store.register(request).await?;
    if let Some(staged) = staged {
        staged.keep()?;
    }
    println!("Voter {} registered successfully!", voter.name);
    Ok(())
}

async fn list_voters<S: RecordStore, K: KeyProvider>(store: &BallotStore<S, K>) -> Result<()> {
    let voters = store.voters().await?;
    if voters.is_empty() {
        println!("No voters registered yet.");
        return Ok(());
    }
    for voter in voters {
        println!(
            "{} {} (born {}, registered {})",
            voter.voter_id,
            voter.name,
            voter.date_of_birth,
            voter.registered_at.to_rfc3339()
        );
    }
    Ok(())
}

async fn render_results<S: RecordStore, K: KeyProvider>(
    store: &BallotStore<S, K>,
) -> Result<String> {
    let counts = store.tally().await?;
    Ok(format_results(&counts, store.candidates()))
}

fn format_results(counts: &Tally, candidates: &CandidateSet) -> String {
    if counts.is_empty() {
        return "No votes have been cast yet.\n".to_string();
    }
    let rows = tally::rows(counts, candidates);
    let width = rows.iter().map(|(label, _)| label.len()).max().unwrap_or(0);
    let mut out = String::new();
    for (label, count) in rows {
        out.push_str(&format!("{label:<width$}  {count}\n"));
    }
    out.push_str(&format!("{:<width$}  {}\n", "Total", tally::total(counts)));
    out
}

/// Runs a quick health check of the key and the record collections.
async fn run_health_check(config: &config::Config) -> Result<()> {
    let records = storage::records_from_config(config)?;
    let keys = storage::keys_from_config(config)?;
    run_store_health(&records, &keys).await?;
    println!("Storage: ok");
    Ok(())
}

async fn run_store_health<S: RecordStore, K: KeyProvider>(records: &S, keys: &K) -> Result<()> {
    let key = keys.get_or_create().await?;
    let cipher = BallotCipher::new(&key)?;
    let sample = b"health-check";
    let sealed = cipher.seal(sample)?;
    if cipher.open(&sealed)? != sample {
        color_eyre::eyre::bail!("ballot cipher round-trip failed");
    }

    let _guard = records.lock_shared().await?;
    for collection in Collection::ALL {
        let count = records.read_all(collection).await?.len();
        info!(%collection, count, "collection readable");
    }
    Ok(())
}

fn init_config(path_override: Option<&Path>) -> Result<()> {
    let path = match path_override {
        Some(path) => path.to_path_buf(),
        None => config::default_path()?,
    };
    let path = config::write_if_missing(&config::Config::with_defaults(), &path)?;
    println!("Config initialized at {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use ballotbox_core::InMemoryRecordStore;
    use ballotbox_service::RegistrationError;
    use ballotbox_storage::key_provider::InMemoryKeyProvider;

    use super::*;
    use crate::storage;

    fn config_in(dir: &Path) -> config::Config {
        config::Config {
            data_dir: Some(dir.join("data")),
            ..config::Config::default()
        }
    }

    fn photo_in(dir: &Path, upload: &str, name: &str) -> PathBuf {
        let folder = dir.join(upload);
        std::fs::create_dir_all(&folder).expect("mkdir");
        let path = folder.join(name);
        std::fs::write(&path, b"png").expect("write photo");
        path
    }

    fn stored_photos(config: &config::Config) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(storage::photos_dir(config).expect("dir"))
            .expect("read faces")
            .map(|e| e.expect("entry").file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    async fn register(config: &config::Config, voter_id: &str, photo: PathBuf) -> Result<()> {
        run_register(
            config,
            Some(voter_id.into()),
            Some("Ada".into()),
            NaiveDate::from_ymd_opt(1990, 1, 1),
            Some(photo),
        )
        .await
    }

    #[tokio::test]
    async fn repeat_registration_reports_duplicate_and_keeps_photo() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = config_in(dir.path());

        register(&config, "V1", photo_in(dir.path(), "upload-1", "ada.png"))
            .await
            .expect("first registration");
        let kept = stored_photos(&config);
        assert_eq!(kept.len(), 1);

        let err = register(&config, "V1", photo_in(dir.path(), "upload-2", "ada.png"))
            .await
            .expect_err("duplicate");
        assert!(matches!(
            err.downcast_ref::<RegistrationError>(),
            Some(RegistrationError::DuplicateVoter { .. })
        ));
        assert_eq!(stored_photos(&config), kept);
    }

    #[tokio::test]
    async fn different_voters_may_upload_same_file_name() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = config_in(dir.path());

        register(&config, "V1", photo_in(dir.path(), "upload-3", "ada.png"))
            .await
            .expect("V1");
        register(&config, "V2", photo_in(dir.path(), "upload-4", "ada.png"))
            .await
            .expect("V2");

        let voters = storage::store_from_config(&config)
            .expect("store")
            .voters()
            .await
            .expect("voters");
        assert_eq!(voters.len(), 2);
        assert_ne!(voters[0].photo_reference, voters[1].photo_reference);
        assert_eq!(stored_photos(&config).len(), 2);
    }

    #[tokio::test]
    async fn health_check_with_test_store_succeeds() {
        let dir = tempfile::tempdir().expect("tempdir");
        let records = ballotbox_storage::json_file_store::JsonFileRecordStore::new(dir.path());
        run_store_health(&records, &InMemoryKeyProvider::default())
            .await
            .expect("health check should succeed");
    }

    #[tokio::test]
    async fn health_check_reports_corrupt_collection() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("voted.json"), "nope").expect("write");
        let records = ballotbox_storage::json_file_store::JsonFileRecordStore::new(dir.path());
        assert!(run_store_health(&records, &InMemoryKeyProvider::default())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn results_list_every_candidate_with_total() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = storage::test_store(dir.path());
        store
            .register(VoterRegistration {
                voter_id: "V1".into(),
                name: "Ada".into(),
                date_of_birth: NaiveDate::from_ymd_opt(1990, 1, 1),
                photo_reference: Some("ada.png".into()),
            })
            .await
            .expect("register");
        store.cast("V1", "Candidate B").await.expect("cast");

        let rendered = render_results(&store).await.expect("render");
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(
            lines,
            vec![
                "Candidate A  0",
                "Candidate B  1",
                "Candidate C  0",
                "Total        1",
            ]
        );
    }

    #[tokio::test]
    async fn empty_log_prints_placeholder() {
        let store = BallotStore::new(
            InMemoryRecordStore::new(),
            InMemoryKeyProvider::default(),
            Default::default(),
        );
        assert_eq!(
            render_results(&store).await.expect("render"),
            "No votes have been cast yet.\n"
        );
    }

    #[test]
    fn init_config_writes_requested_path() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        init_config(Some(&path)).expect("init");

        let loaded = config::load_from_path(&path).expect("load");
        assert_eq!(loaded, config::Config::with_defaults());
    }
}
