use std::env;
use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use wayfinder_agents::DialogueManager;
use wayfinder_lookup::airports::DEFAULT_AIRPORTS_URL;
use wayfinder_lookup::{
    resolve_chat_model, resolve_place, search_flights, AirportDirectory, ChatModel, RestCountries,
    SerpApiClient,
};
use wayfinder_observability::{init_tracing, AppMetrics};

#[derive(Debug, Parser)]
#[command(name = "wayfinder")]
#[command(about = "Wayfinder travel planner CLI")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Interactive slot-filling chat against the dialogue manager.
    Chat,
    /// Resolve a place to its nearest commercial airport.
    Airport { place: String },
    /// Resolve a place to coordinates.
    Geocode { place: String },
    /// Search flights between two places with nearest-airport fallback.
    Flight {
        #[arg(long)]
        from: String,
        #[arg(long)]
        to: String,
        #[arg(long)]
        outbound: String,
        #[arg(long = "return")]
        return_date: String,
        #[arg(long, default_value = "USD")]
        currency: String,
    },
}

struct Runtime {
    search: SerpApiClient,
    countries: RestCountries,
    directory: Arc<AirportDirectory>,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing("wayfinder_cli");
    let cli = Cli::parse();

    let http = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(6))
        .timeout(Duration::from_secs(20))
        .build()
        .context("failed to build HTTP client")?;

    match cli.command {
        Command::Chat => run_chat(http).await?,
        Command::Airport { place } => {
            let runtime = build_runtime(http).await;
            match resolve_place(
                &runtime.search,
                &runtime.countries,
                runtime.directory.as_ref(),
                &place,
            )
            .await
            {
                Ok(resolution) => println!("{}", serde_json::to_string_pretty(&resolution)?),
                Err(error) => println!("{error}"),
            }
        }
        Command::Geocode { place } => {
            let runtime = build_runtime(http).await;
            match wayfinder_lookup::resolve_coordinates(
                &runtime.search,
                &runtime.countries,
                &place,
            )
            .await
            {
                Some((lat, lon)) => println!("{lat}, {lon}"),
                None => println!("Could not find coordinates for '{place}'"),
            }
        }
        Command::Flight {
            from,
            to,
            outbound,
            return_date,
            currency,
        } => {
            let runtime = build_runtime(http).await;
            match search_flights(
                &runtime.search,
                &runtime.countries,
                runtime.directory.as_ref(),
                &from,
                &to,
                &outbound,
                &return_date,
                &currency,
            )
            .await
            {
                Ok(result) => println!("{}", serde_json::to_string_pretty(&result.summary)?),
                Err(error) => println!("{error}"),
            }
        }
    }

    Ok(())
}

async fn build_runtime(http: reqwest::Client) -> Runtime {
    let search = SerpApiClient::new(http.clone(), env::var("SERPAPI_API_KEY").unwrap_or_default());
    let countries = RestCountries::new(http.clone());
    let airports_url =
        env::var("WAYFINDER_AIRPORTS_URL").unwrap_or_else(|_| DEFAULT_AIRPORTS_URL.to_string());
    let directory = Arc::new(AirportDirectory::load(&http, &airports_url).await);

    Runtime {
        search,
        countries,
        directory,
    }
}

async fn run_chat(http: reqwest::Client) -> Result<()> {
    let model: Arc<dyn ChatModel> = Arc::new(resolve_chat_model(http)?);
    let manager = DialogueManager::new(model, AppMetrics::shared());
    let session_id = "cli";

    println!("Wayfinder chat mode. type 'exit' to quit.");

    loop {
        print!("> ");
        io::stdout().flush()?;

        let mut line = String::new();
        io::stdin().read_line(&mut line)?;

        let message = line.trim();
        if message.eq_ignore_ascii_case("exit") || message.eq_ignore_ascii_case("quit") {
            break;
        }

        if message.is_empty() {
            continue;
        }

        let turn = manager.handle_turn(session_id, message).await;

        println!("\n{}\n", turn.reply);

        if turn.done {
            println!("All trip details collected. Run the API to generate an itinerary.");
            break;
        }
    }

    Ok(())
}
