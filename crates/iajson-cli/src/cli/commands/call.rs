use serde_json::json;
use tracing::debug;

use crate::cli::args::CallArgs;
use crate::cli::helpers::{connect, parse_params, print_json};
use crate::cli::EXIT_SUCCESS;

pub async fn run(args: CallArgs) -> anyhow::Result<i32> {
    let params = parse_params(args.json_params.as_deref(), &args.params)?;
    let client = connect(&args.site).await?;
    if let Some(token) = args.access_token.as_deref().filter(|t| !t.is_empty()) {
        client.set_access_token(token).await;
    }

    if args.dry_run {
        let prepared = client.prepare(&args.operation, params).await?;
        print_json(&json!({
            "operation": prepared.operation,
            "tier": prepared.tier.as_str(),
            "method": prepared.method.as_str(),
            "url": prepared.url,
            "headers": prepared
                .headers
                .iter()
                .map(|(name, value)| {
                    let shown = if name.eq_ignore_ascii_case("authorization") {
                        "Bearer ***".to_string()
                    } else {
                        value.clone()
                    };
                    json!([name, shown])
                })
                .collect::<Vec<_>>(),
            "body": prepared.body,
        }))?;
        return Ok(EXIT_SUCCESS);
    }

    debug!(operation = %args.operation, "invoking operation");
    let result = client.call(&args.operation, params).await?;
    print_json(&result)?;
    Ok(EXIT_SUCCESS)
}
