use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use chrono::{Duration, Local, NaiveDate};
use clap::{Parser, Subcommand};
use palpites_client::{initialize_client, Availability, ClientConfig, PrimaryBackend, StorageCoordinator};
use shared::{Gender, GuessInput, GuessRecord};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "palpites")]
#[command(about = "Save and read gender-reveal guesses", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Origin the site is served from (overrides PALPITES_ORIGIN)
    #[arg(long, global = true)]
    origin: Option<String>,

    /// Network backend to try first (overrides PALPITES_PRIMARY)
    #[arg(long, global = true)]
    primary: Option<PrimaryBackend>,

    /// Directory for local storage (overrides PALPITES_DATA_DIR)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Save a guess
    Submit {
        #[arg(long)]
        name: String,

        /// menina or menino
        #[arg(long)]
        gender: Gender,

        #[arg(long)]
        message: String,

        #[arg(long)]
        suggested_name: Option<String>,

        /// Guess date as YYYY-MM-DD, today when omitted
        #[arg(long)]
        date: Option<NaiveDate>,
    },

    /// List every guess, newest first
    #[command(alias = "ls")]
    List,

    /// Totals by gender and the winner
    Stats,

    /// Show the winning guess
    Winner,

    /// Delete every guess
    Clear {
        /// Required, there is no undo
        #[arg(long)]
        yes: bool,
    },

    /// Write all guesses to palpites_<date>.json
    Export {
        #[arg(long, default_value = ".")]
        dir: PathBuf,
    },

    /// Replace the stored guesses with sample data
    Seed,

    /// Check whether the network backend answers
    Probe,
}

/// Sample guests (name, gender, suggested name, message), oldest first
const SAMPLE_GUESSES: &[(&str, Gender, &str, &str)] = &[
    ("Ana Silva", Gender::Girl, "Isabella", "Que venha com saúde e muita alegria! Desejo tudo de melhor para essa família especial."),
    ("Carlos Oliveira", Gender::Boy, "Gabriel", "Parabéns pelo bebê! Que ele traga muitas felicidades e momentos inesquecíveis."),
    ("Maria Santos", Gender::Girl, "Sofia", "Que esse momento seja repleto de amor e carinho. Desejo toda felicidade do mundo!"),
    ("João Pereira", Gender::Boy, "Miguel", "Parabéns! Que o bebê seja abençoado e traga muita luz para a família."),
    ("Fernanda Costa", Gender::Girl, "Alice", "Desejo que essa nova vida seja cheia de sorrisos e momentos especiais!"),
    ("Roberto Alves", Gender::Boy, "Rafael", "Parabéns pelo chá de revelação! Que o bebê seja saudável e feliz."),
    ("Juliana Ferreira", Gender::Girl, "Laura", "Que momento especial! Desejo toda felicidade e saúde para o bebê e a família."),
    ("Paulo Mendes", Gender::Boy, "Lucas", "Parabéns! Que essa nova jornada seja repleta de amor e alegria."),
    ("Patricia Lima", Gender::Girl, "Julia", "Desejo que o bebê traga muita felicidade e realizações para todos vocês!"),
    ("Marcia Brandão", Gender::Girl, "Beatriz", "Que lindo esse momento! Parabéns e que venha com muito amor e carinho!"),
    ("Ricardo Souza", Gender::Boy, "Enzo", "Parabéns pela nova vida que está chegando! Desejo toda felicidade do mundo!"),
];

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = ClientConfig::from_env();
    if let Some(origin) = cli.origin {
        config.origin = origin;
    }
    if let Some(primary) = cli.primary {
        config.primary = primary;
    }
    if let Some(data_dir) = cli.data_dir {
        config.data_dir = data_dir;
    }

    let coordinator = initialize_client(&config)
        .await
        .context("Failed to prepare storage")?;

    run(cli.command, &coordinator).await
}

async fn run(command: Commands, coordinator: &StorageCoordinator) -> Result<()> {
    match command {
        Commands::Submit {
            name,
            gender,
            message,
            suggested_name,
            date,
        } => {
            let input = GuessInput {
                name,
                gender,
                suggested_name,
                message,
                guess_date: date.unwrap_or_else(|| Local::now().date_naive()),
            };
            let outcome = coordinator.create(input).await?;
            println!("Palpite #{} salvo ({})", outcome.id, outcome.driver);
            if outcome.is_winner {
                println!("🎉 Parabéns! Você é o ganhador do prêmio!");
            }
        }
        Commands::List => {
            let listed = coordinator.list_all().await?;
            println!("{} palpites ({})", listed.value.len(), listed.driver);
            for record in &listed.value {
                print_record(record);
            }
        }
        Commands::Stats => {
            let stats = coordinator.aggregate().await?;
            let totals = &stats.value;
            println!("Total: {} ({})", totals.total, stats.driver);
            println!("Meninas: {} ({:.1}%)", totals.girl_count, totals.girl_percentage());
            println!("Meninos: {} ({:.1}%)", totals.boy_count, totals.boy_percentage());
            println!("Ganhador: {}", totals.winner_name.as_deref().unwrap_or("-"));
        }
        Commands::Winner => {
            let winner = coordinator.get_winner().await?;
            match &winner.value {
                Some(record) => {
                    println!("Ganhador ({}):", winner.driver);
                    print_record(record);
                }
                None => println!("Ainda não há ganhador ({})", winner.driver),
            }
        }
        Commands::Clear { yes } => {
            if !yes {
                bail!("Refusing to delete every guess without --yes");
            }
            let cleared = coordinator.clear_all().await?;
            println!("Todos os palpites foram removidos ({})", cleared.driver);
        }
        Commands::Export { dir } => {
            let exported = coordinator.export(&dir).await?;
            println!("Exportado para {} ({})", exported.value.display(), exported.driver);
        }
        Commands::Seed => seed(coordinator).await?,
        Commands::Probe => match coordinator.probe().await {
            Some((driver, Availability::Reachable)) => println!("{driver}: disponível"),
            Some((driver, Availability::Unreachable)) => println!("{driver}: indisponível"),
            None => println!("Sem backend de rede, usando armazenamento local"),
        },
    }
    Ok(())
}

async fn seed(coordinator: &StorageCoordinator) -> Result<()> {
    coordinator.clear_all().await?;
    let today = Local::now().date_naive();
    let days_back = SAMPLE_GUESSES.len() as i64 - 1;

    for (i, (name, gender, suggested, message)) in SAMPLE_GUESSES.iter().enumerate() {
        let input = GuessInput {
            name: name.to_string(),
            gender: *gender,
            suggested_name: Some(suggested.to_string()),
            message: message.to_string(),
            guess_date: today - Duration::days(days_back - i as i64),
        };
        let outcome = coordinator.create(input).await?;
        let flag = if outcome.is_winner { " [GANHADOR]" } else { "" };
        println!("  {}. {} - {} - ID: {} ({}){}", i + 1, name, gender, outcome.id, outcome.driver, flag);
    }
    Ok(())
}

fn print_record(record: &GuessRecord) {
    let flag = if record.is_winner { " 🏆" } else { "" };
    println!(
        "#{} {} ({}) {} - {}{}",
        record.id,
        record.name,
        record.gender,
        record.guess_date,
        record.message,
        flag
    );
    if let Some(suggested) = &record.suggested_name {
        println!("    sugestão: {suggested}");
    }
}
