use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use serde_json::{Value, json};
use yieldlink::map::{ALTERNATIVE_CROPS, filter_areas};
use yieldlink::net::types::{ListingDraft, LocationInfo, MarketplaceListing, ProfileUpdate, SignupRequest};
use yieldlink::state::guard::{GuardDecision, Route};
use yieldlink::util::contact::ContactKind;
use yieldlink::util::listing::{ListingFilter, NO_CROP_FOUND, filter_listings, suggest_crops};
use yieldlink::{ApiError, ClientConfig, YieldLink};

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("{0}")]
    Api(#[from] ApiError),
    #[error("failed to render output: {0}")]
    Render(#[from] serde_json::Error),
    #[error("nothing to update; pass at least one field")]
    EmptyUpdate,
    #[error("not logged in; run `yieldlink login` first")]
    NotLoggedIn,
}

#[derive(Parser, Debug)]
#[command(name = "yieldlink", about = "YieldLink farming platform CLI")]
struct Cli {
    #[arg(long, env = "YIELDLINK_API_BASE_URL")]
    base_url: Option<String>,

    #[arg(long, env = "YIELDLINK_SESSION_DIR")]
    session_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    Login {
        /// Email or phone number.
        identifier: String,
        #[arg(long, env = "YIELDLINK_PASSWORD")]
        password: String,
    },
    Signup(SignupArgs),
    Logout,
    Whoami,
    /// Show what navigating to a route would do.
    Guard {
        path: String,
    },
    Crops {
        /// Autocomplete crop names containing this text.
        #[arg(long = "match")]
        matching: Option<String>,
    },
    Tracker(TrackerCommand),
    Market(MarketCommand),
    Profile(ProfileCommand),
    Suggest {
        query: String,
    },
    Map {
        #[arg(long, default_value = "all")]
        crop: String,
    },
}

#[derive(Args, Debug)]
struct SignupArgs {
    #[arg(long)]
    name: String,
    #[arg(long)]
    phone: String,
    #[arg(long)]
    email: String,
    #[arg(long, env = "YIELDLINK_PASSWORD")]
    password: String,
    #[arg(long)]
    location: Option<String>,
}

#[derive(Args, Debug)]
struct TrackerCommand {
    #[command(subcommand)]
    command: TrackerSubcommand,
}

#[derive(Subcommand, Debug)]
enum TrackerSubcommand {
    List,
    Add { crop_id: String },
    Remove { tracker_id: String },
}

#[derive(Args, Debug)]
struct MarketCommand {
    #[command(subcommand)]
    command: MarketSubcommand,
}

#[derive(Args, Debug)]
struct ListingFilterArgs {
    #[arg(long, default_value = "")]
    crop: String,
    #[arg(long, default_value = "")]
    location: String,
}

#[derive(Args, Debug)]
struct ListingArgs {
    #[arg(long)]
    crop: String,
    #[arg(long)]
    location: String,
    #[arg(long)]
    quantity: Option<String>,
    #[arg(long)]
    contact: Option<String>,
}

impl ListingArgs {
    fn into_draft(self) -> ListingDraft {
        ListingDraft { crop_name: self.crop, location: self.location, quantity: self.quantity, contact: self.contact }
    }
}

#[derive(Subcommand, Debug)]
enum MarketSubcommand {
    List(ListingFilterArgs),
    Mine(ListingFilterArgs),
    Add(ListingArgs),
    Update {
        listing_id: String,
        #[command(flatten)]
        listing: ListingArgs,
    },
    Delete {
        listing_id: String,
    },
}

#[derive(Args, Debug)]
struct ProfileCommand {
    #[command(subcommand)]
    command: ProfileSubcommand,
}

#[derive(Subcommand, Debug)]
enum ProfileSubcommand {
    Show,
    Update {
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        phone: Option<String>,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        location: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let mut config = ClientConfig::from_env()?;
    if let Some(base_url) = cli.base_url {
        config.api_base_url = base_url.trim_end_matches('/').to_owned();
    }
    if let Some(dir) = cli.session_dir {
        config.session_dir = dir;
    }
    let app = YieldLink::from_config(&config)?;

    match cli.command {
        Command::Login { identifier, password } => {
            let session = app.auth.login(&identifier, &password).await?;
            print_json(&json!({ "id": session.id, "email": session.email, "name": session.name }))
        }
        Command::Signup(args) => run_signup(&app, args).await,
        Command::Logout => {
            app.auth.logout()?;
            println!("logged out");
            Ok(())
        }
        Command::Whoami => {
            let session = app.sessions.current().ok_or(CliError::NotLoggedIn)?;
            print_json(&json!({ "id": session.id, "email": session.email, "name": session.name }))
        }
        Command::Guard { path } => {
            let route = Route::from_path(&path);
            let decision = match app.navigate(route) {
                GuardDecision::ShowLoading => "loading".to_owned(),
                GuardDecision::Render => format!("render {}", route.path()),
                GuardDecision::Redirect(to) => format!("redirect {to}"),
            };
            println!("{decision}");
            Ok(())
        }
        Command::Crops { matching } => {
            let crops = app.api.list_crops().await?;
            let Some(input) = matching else {
                return print_json(&serde_json::to_value(crops)?);
            };
            let suggestions = suggest_crops(&crops, &input);
            if suggestions.is_empty() {
                println!("{NO_CROP_FOUND}");
            }
            for crop in suggestions {
                println!("{}", crop.name);
            }
            Ok(())
        }
        Command::Tracker(tracker) => run_tracker(&app, tracker).await,
        Command::Market(market) => run_market(&app, market).await,
        Command::Profile(profile) => run_profile(&app, profile).await,
        Command::Suggest { query } => {
            let suggestions = app.api.suggest_locations(&query).await?;
            for suggestion in suggestions {
                println!("{}", suggestion.label);
            }
            Ok(())
        }
        Command::Map { crop } => print_json(&json!({
            "areas": filter_areas(&crop),
            "alternatives": ALTERNATIVE_CROPS,
        })),
    }
}

fn init_tracing() {
    let level = std::env::var("YIELDLINK_LOG")
        .ok()
        .and_then(|raw| raw.parse::<tracing::Level>().ok())
        .unwrap_or(tracing::Level::WARN);
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

async fn run_signup(app: &YieldLink, args: SignupArgs) -> Result<(), CliError> {
    let request = SignupRequest {
        name: args.name,
        phone: args.phone,
        email: args.email,
        password: args.password,
        location: args
            .location
            .map(|name| LocationInfo { name: Some(name), ..LocationInfo::default() }),
    };
    let session = app.auth.signup(&request).await?;
    print_json(&json!({ "id": session.id, "email": session.email, "name": session.name }))
}

async fn run_tracker(app: &YieldLink, tracker: TrackerCommand) -> Result<(), CliError> {
    match tracker.command {
        TrackerSubcommand::List => print_json(&serde_json::to_value(app.api.my_tracked_crops().await?)?),
        TrackerSubcommand::Add { crop_id } => {
            app.api.track_crop(&crop_id).await?;
            print_json(&serde_json::to_value(app.api.my_tracked_crops().await?)?)
        }
        TrackerSubcommand::Remove { tracker_id } => {
            app.api.untrack_crop(&tracker_id).await?;
            print_json(&serde_json::to_value(app.api.my_tracked_crops().await?)?)
        }
    }
}

async fn run_market(app: &YieldLink, market: MarketCommand) -> Result<(), CliError> {
    match market.command {
        MarketSubcommand::List(filter) => {
            let filter = ListingFilter::from_input(&filter.crop, &filter.location);
            let listings = app.api.list_listings(&filter).await?;
            print_listings(app, &listings)
        }
        MarketSubcommand::Mine(filter) => {
            let listings = app.api.list_my_listings().await?;
            print_listings(app, &filter_listings(listings, &filter.crop, &filter.location))
        }
        MarketSubcommand::Add(listing) => {
            app.api.add_listing(&listing.into_draft()).await?;
            println!("listing posted");
            Ok(())
        }
        MarketSubcommand::Update { listing_id, listing } => {
            app.api.update_listing(&listing_id, &listing.into_draft()).await?;
            println!("listing {listing_id} updated");
            Ok(())
        }
        MarketSubcommand::Delete { listing_id } => {
            app.api.delete_listing(&listing_id).await?;
            println!("listing {listing_id} deleted");
            Ok(())
        }
    }
}

async fn run_profile(app: &YieldLink, profile: ProfileCommand) -> Result<(), CliError> {
    match profile.command {
        ProfileSubcommand::Show => print_json(&serde_json::to_value(app.api.fetch_profile().await?)?),
        ProfileSubcommand::Update { name, phone, email, location } => {
            let update = ProfileUpdate { name, phone, email, location };
            if update.is_empty() {
                return Err(CliError::EmptyUpdate);
            }
            app.api.update_profile(&update).await?;
            print_json(&serde_json::to_value(app.api.fetch_profile().await?)?)
        }
    }
}

fn print_listings(app: &YieldLink, listings: &[MarketplaceListing]) -> Result<(), CliError> {
    let rows = listings
        .iter()
        .map(|listing| {
            let contact = ContactKind::classify(listing.contact.as_deref());
            let mut row = serde_json::to_value(listing)?;
            if let Value::Object(map) = &mut row {
                map.insert("contactDisplay".to_owned(), Value::String(contact.display().to_owned()));
                map.insert("contactLink".to_owned(), contact.link().map_or(Value::Null, Value::String));
                map.insert("editable".to_owned(), Value::Bool(app.api.can_edit(listing)));
            }
            Ok(row)
        })
        .collect::<Result<Vec<_>, serde_json::Error>>()?;
    print_json(&Value::Array(rows))
}

fn print_json(value: &Value) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value)?;
    println!("{rendered}");
    Ok(())
}
