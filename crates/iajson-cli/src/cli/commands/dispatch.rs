use super::super::args::*;

pub async fn dispatch(cli: Cli) -> anyhow::Result<i32> {
    match cli.cmd {
        Command::Discover(args) => super::discover::run(args).await,
        Command::Endpoints(args) => super::discover::run_endpoints(args).await,
        Command::Sign(args) => super::sign::run(args),
        Command::VerifySignature(args) => super::sign::run_verify(args),
        Command::Register(args) => super::register::run(args).await,
        Command::Verify(args) => super::register::run_verify(args).await,
        Command::AuthUrl(args) => super::auth_url::run(args).await,
        Command::Call(args) => super::call::run(args).await,
    }
}
