use crate::server;
use clap::{Args, Parser, Subcommand};
use listing_intake::config::{AppConfig, ListingPolicy};
use listing_intake::error::AppError;
use listing_intake::listings::{MaxListings, Role};

#[derive(Parser, Debug)]
#[command(
    name = "Listing Intake",
    about = "Run the listing submission and moderation service",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Print the effective quota, approval, tenant and image policy
    Policy(PolicyArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
}

#[derive(Args, Debug, Default)]
pub(crate) struct PolicyArgs {
    /// Emit the policy as JSON instead of text tables
    #[arg(long)]
    pub(crate) json: bool,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Policy(args) => {
            let config = AppConfig::load()?;
            let rendered = if args.json {
                serde_json::to_string_pretty(&policy_json(&config.listings))?
            } else {
                render_policy(&config.listings)
            };
            println!("{rendered}");
            Ok(())
        }
    }
}

fn max_label(max: MaxListings) -> String {
    match max {
        MaxListings::Limited(limit) => limit.to_string(),
        MaxListings::Unlimited => "unlimited".to_string(),
    }
}

pub(crate) fn render_policy(policy: &ListingPolicy) -> String {
    let mut lines = vec!["Listing quota (role / tier / max)".to_string()];
    for entry in policy.quota.entries() {
        lines.push(format!(
            "  {:<14} {:<11} {}",
            entry.role.to_string(),
            entry.tier.to_string(),
            max_label(entry.max)
        ));
    }
    lines.push(format!(
        "  default allowance: {}",
        max_label(policy.quota.default_max())
    ));

    lines.push(String::new());
    lines.push("Initial status by role".to_string());
    for role in Role::ALL {
        lines.push(format!(
            "  {:<14} {:?}",
            role.to_string(),
            policy.approval.rule_for(role)
        ));
    }
    let restricted: Vec<&str> = policy
        .approval
        .restricted_environments()
        .iter()
        .map(|environment| environment.label())
        .collect();
    lines.push(format!("  restricted environments: {}", restricted.join(", ")));

    lines.push(String::new());
    lines.push("Country routing".to_string());
    for (country, site) in policy.tenants.entries() {
        lines.push(format!("  {country} -> {site}"));
    }
    lines.push(format!("  default site: {}", policy.tenants.default_site()));

    lines.push(String::new());
    lines.push(format!(
        "Image ceilings: sale {}, rental {}",
        policy.image_ceilings.sale, policy.image_ceilings.rental
    ));

    lines.join("\n")
}

fn policy_json(policy: &ListingPolicy) -> serde_json::Value {
    let quota: Vec<_> = policy.quota.entries().collect();
    let approval: serde_json::Map<String, serde_json::Value> = policy
        .approval
        .rules()
        .map(|(role, rule)| (role.to_string(), serde_json::json!(rule)))
        .collect();
    let tenants: serde_json::Map<String, serde_json::Value> = policy
        .tenants
        .entries()
        .map(|(country, site)| (country.to_string(), serde_json::json!(site)))
        .collect();

    serde_json::json!({
        "quota": quota,
        "default_max_listings": policy.quota.default_max(),
        "approval": approval,
        "restricted_environments": policy.approval.restricted_environments(),
        "tenants": tenants,
        "default_site": policy.tenants.default_site(),
        "image_ceilings": policy.image_ceilings,
    })
}
