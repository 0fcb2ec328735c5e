use iajson_client::AccessTier;
use serde_json::json;

use crate::cli::args::{DiscoverArgs, EndpointsArgs, TierArg};
use crate::cli::helpers::{connect, print_json};
use crate::cli::EXIT_SUCCESS;

pub async fn run(args: DiscoverArgs) -> anyhow::Result<i32> {
    let client = connect(&args.site).await?;
    let manifest = client.manifest();

    if args.json {
        print_json(&serde_json::to_value(manifest)?)?;
        return Ok(EXIT_SUCCESS);
    }

    println!("{} ({})", manifest.site.name, manifest.site.site_type);
    println!("  version:  {}", manifest.version);
    println!("  base_url: {}", manifest.api.base_url);
    for tier in AccessTier::ALL {
        println!("  {:<14} {}", tier.as_str(), client.endpoints(Some(tier)).len());
    }
    if let Some(cfg) = manifest.signed_key() {
        println!("  signed_key: {} ({})", cfg.register_url, cfg.algorithm);
    }
    if let Some(cfg) = manifest.oauth2() {
        println!(
            "  oauth2: {} (pkce {})",
            cfg.authorization_url,
            if cfg.pkce_required { "required" } else { "optional" }
        );
    }
    Ok(EXIT_SUCCESS)
}

pub async fn run_endpoints(args: EndpointsArgs) -> anyhow::Result<i32> {
    let client = connect(&args.site).await?;
    let tier = args.tier.map(|t| match t {
        TierArg::Public => AccessTier::Public,
        TierArg::Protected => AccessTier::Protected,
        TierArg::UserRequired => AccessTier::UserRequired,
    });

    let listing: Vec<_> = client
        .endpoints(tier)
        .into_iter()
        .map(|op| {
            json!({
                "name": op.name,
                "method": op.method.as_str(),
                "path": op.path_template,
                "tier": op.tier.as_str(),
                "description": op.description,
                "deprecated": op.deprecated,
            })
        })
        .collect();

    print_json(&serde_json::Value::Array(listing))?;
    Ok(EXIT_SUCCESS)
}
