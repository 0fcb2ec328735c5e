use std::sync::Arc;

use iajson_client::{OAuthFlow, ReqwestTransport};

use crate::cli::args::AuthUrlArgs;
use crate::cli::helpers::connect;
use crate::cli::EXIT_SUCCESS;

pub async fn run(args: AuthUrlArgs) -> anyhow::Result<i32> {
    let client = connect(&args.site).await?;
    let transport = ReqwestTransport::with_user_agent(&client.config().user_agent)?;
    let flow = OAuthFlow::from_manifest(client.manifest(), args.client_id, Arc::new(transport))?;

    let scopes = (!args.scopes.is_empty()).then_some(args.scopes.as_slice());
    let request = flow.authorization_request(&args.redirect_uri, scopes, args.state.as_deref())?;

    println!("{}", request.url);
    eprintln!("state: {}", request.state);
    if let Some(pkce) = &request.pkce {
        eprintln!("code_verifier: {}", pkce.verifier());
    }
    Ok(EXIT_SUCCESS)
}
