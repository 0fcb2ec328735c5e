use iajson_client::AgentInfo;

use crate::cli::args::{RegisterArgs, VerifyArgs};
use crate::cli::helpers::{connect, print_json};
use crate::cli::EXIT_SUCCESS;

pub async fn run(args: RegisterArgs) -> anyhow::Result<i32> {
    let client = connect(&args.site).await?;

    let mut agent = AgentInfo::new(args.name, args.agent_domain, args.webhook_url, args.contact);
    if let Some(description) = args.description {
        agent = agent.with_description(description);
    }

    let ack = client.register_agent(&agent).await?;
    print_json(&ack)?;
    eprintln!("registration submitted; run `iajson verify` with the code delivered to your webhook");
    Ok(EXIT_SUCCESS)
}

pub async fn run_verify(args: VerifyArgs) -> anyhow::Result<i32> {
    let client = connect(&args.site).await?;
    let credential = client
        .complete_registration(&args.code, args.verify_url.as_deref())
        .await?;

    println!("IAJSON_API_KEY={}", credential.api_key);
    println!("IAJSON_SECRET={}", credential.secret.expose());
    if let Some(expires_at) = credential.expires_at {
        eprintln!("credential expires at {}", expires_at.to_rfc3339());
    }
    if !credential.permissions.is_empty() {
        eprintln!("permissions: {}", credential.permissions.join(", "));
    }
    Ok(EXIT_SUCCESS)
}
