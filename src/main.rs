// ┌┐┌┌─┐┌┬┐┌─┐┌─┐┬
// ││││├┤  │ └─┐│  │
// ┘└┘└─┘ ┴ └─┘└─┘┴

// Requires an OpenAI-compatible completion endpoint (OPENAI_API_KEY)
// Asks the model for ten scored paper recommendations per query and serves
// them over HTTP; also ships a small terminal client for the same API.

use anyhow::Result;
use clap::Parser;
use std::io::{BufRead, Write};

mod client;
mod recommend;
mod repair;
mod taxonomy;
mod web;

use client::{ApiClient, Submitter};
use recommend::Recommender;
use taxonomy::Taxonomy;

#[derive(Parser, Debug)]
#[command(author, version, about = "NetSci paper recommender over an OpenAI-style completion API", long_about = None)]
struct Args {
    // The rendering front end calls in from another origin, so listen on
    // all interfaces unless told otherwise.
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    #[arg(short, long, default_value = "3001")]
    port: u16,

    #[arg(long, default_value = "https://api.openai.com/v1")]
    api_base: String,

    #[arg(short, long, default_value = "gpt-4")]
    model: String,

    #[arg(long, default_value = "taxonomy.json")]
    taxonomy: String,

    // Upstream calls can take many seconds; cap them explicitly.
    #[arg(long, default_value = "60")]
    timeout: u64,

    // Run the interactive terminal client instead of the server.
    #[arg(long, default_value_t = false)]
    client: bool,

    #[arg(long, default_value = "http://localhost:3001")]
    server_url: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.client {
        return run_client(args).await;
    }

    // The one required secret; refuse to serve anything without it.
    let api_key = match std::env::var("OPENAI_API_KEY") {
        Ok(k) if !k.trim().is_empty() => k,
        _ => {
            eprintln!("ERROR: Missing OpenAI API key. Set OPENAI_API_KEY and restart.");
            std::process::exit(1);
        }
    };

    println!("{}", "=".repeat(64));
    println!("   NetSci Paper Recommender");
    println!("{}", "=".repeat(64));
    println!("Model: {}", args.model);
    println!("Endpoint: {}", args.api_base);
    println!("Timeout: {}s\n", args.timeout);

    let host: std::net::IpAddr = args
        .host
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid --host {}: {}", args.host, e))?;

    let taxonomy = Taxonomy::load(&args.taxonomy);
    let recommender = Recommender::new(api_key, args.api_base, args.model, args.timeout)?;

    web::start_server(host, args.port, recommender, taxonomy).await;
    Ok(())
}

// Terminal client: one query per line, results as a table. ":field X"
// re-filters the last results locally, ":history" shows recent queries.
async fn run_client(args: Args) -> Result<()> {
    println!("{}", "=".repeat(64));
    println!("   NetSci client - {}", args.server_url);
    println!("   Type a query, \":field <name>\", \":history\", or \"exit\"");
    println!("{}", "=".repeat(64));

    let taxonomy = Taxonomy::load(&args.taxonomy);
    if !taxonomy.is_empty() {
        println!("Fields: {}", taxonomy.field_names().join(", "));
    }
    let api = ApiClient::new(&args.server_url, args.timeout)?;
    let mut submitter = Submitter::new();

    let stdin = std::io::stdin();
    let mut lines = stdin.lock().lines();

    loop {
        print!("query> ");
        std::io::stdout().flush()?;

        let line = match lines.next() {
            Some(l) => l?,
            None => break,
        };
        let line = line.trim();

        if line == "exit" || line == "quit" {
            break;
        }

        if line == ":history" {
            for q in submitter.history() {
                println!("  {}", q);
            }
            continue;
        }

        if let Some(field) = line.strip_prefix(":field") {
            let field = field.trim();
            let field = if field.is_empty() {
                None
            } else {
                Some(field.to_string())
            };
            submitter.set_field(field, &taxonomy);
            client::render(&submitter);
            continue;
        }

        match submitter.begin(line) {
            Err(msg) => println!("{}", msg),
            Ok(ticket) => {
                // One request per submission, applied only if still current.
                let outcome = api.search(line).await;
                submitter.finish(ticket, outcome, &taxonomy);
                client::render(&submitter);
            }
        }
    }

    Ok(())
}
