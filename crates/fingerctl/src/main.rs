mod config;

use clap::{Parser, Subcommand};
use fingerpost::Instance;
use miette::{IntoDiagnostic, Result, WrapErr, miette};
use std::path::PathBuf;
use url::form_urlencoded;

/// Fingerpost admin CLI for resolving handles and managing webfinger endpoints
#[derive(Parser)]
#[command(name = "fingerctl")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the instance configuration
    #[arg(long, env = "FINGERPOST_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve a remote handle or actor URL via webfinger
    Resolve {
        /// Handle (nick@domain, @nick@domain, !group@domain, domain/@nick) or actor URL
        handle: String,

        /// Also fetch and print the actor document
        #[arg(long)]
        actor: bool,
    },

    /// Create the webfinger endpoint of a local account
    Create {
        /// Account nickname
        nickname: String,

        /// PEM file with the account's public key
        #[arg(long)]
        public_key: Option<PathBuf>,

        /// The account is a group
        #[arg(long)]
        group: bool,
    },

    /// Print the document served for a webfinger resource
    Lookup {
        /// e.g. acct:bob@example.com or https://example.com/users/bob
        resource: String,
    },

    /// Reconcile an account's webfinger endpoint with its profile
    Resync {
        /// Account nickname
        nickname: String,
    },
}

/// Request target for a webfinger lookup of `resource`
fn lookup_target(resource: &str) -> String {
    let query = form_urlencoded::Serializer::new(String::new())
        .append_pair("resource", resource)
        .finish();
    format!("/.well-known/webfinger?{}", query)
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    let pretty = serde_json::to_string_pretty(value)
        .into_diagnostic()
        .wrap_err("Failed to serialize output")?;
    println!("{}", pretty);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt().with_env_filter("warn").init();

    let cli = Cli::parse();
    let config = config::load_config(cli.config.as_deref())?;
    let instance = Instance::from_config(config)
        .into_diagnostic()
        .wrap_err("Failed to set up instance")?;

    match cli.command {
        Commands::Resolve { handle, actor } => {
            let jrd = instance
                .resolve(&handle)
                .await
                .into_diagnostic()
                .wrap_err_with(|| format!("Failed to resolve {}", handle))?;
            print_json(&jrd)?;

            if actor {
                let url = jrd.actor_url().ok_or_else(|| {
                    miette!(
                        help = "The remote server did not publish an ActivityPub self link",
                        "No actor URL for {}",
                        handle
                    )
                })?;
                let document = instance
                    .resolver
                    .actor(url, &instance.config.domain)
                    .await
                    .into_diagnostic()
                    .wrap_err_with(|| format!("Failed to fetch actor {}", url))?;
                print_json(&document)?;
            }
        }

        Commands::Create {
            nickname,
            public_key,
            group,
        } => {
            let pem = public_key
                .as_deref()
                .map(config::read_public_key)
                .transpose()?;
            let document = instance
                .create_account_endpoint(&nickname, pem.as_deref(), group)
                .into_diagnostic()
                .wrap_err_with(|| format!("Failed to create endpoint for {}", nickname))?;
            print_json(&document)?;
        }

        Commands::Lookup { resource } => {
            let target = lookup_target(&resource);
            let document = instance.lookup(&target).ok_or_else(|| {
                miette!(
                    help = "Create the endpoint first with: fingerctl create <nickname>",
                    "No webfinger endpoint for {}",
                    resource
                )
            })?;
            print_json(&document)?;
        }

        Commands::Resync { nickname } => {
            if instance.resync(&nickname) {
                println!("Webfinger endpoint for '{}' updated", nickname);
            } else {
                println!("Webfinger endpoint for '{}' unchanged", nickname);
            }
        }
    }

    Ok(())
}
