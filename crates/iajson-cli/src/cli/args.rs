use clap::{Args, Parser, Subcommand, ValueEnum};


#[derive(Parser)]
#[command(
    name = "iajson",
    version,
    about = "Client for ia.json sites: discovery, signed requests and OAuth2"
)]
pub struct Cli {
    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Fetch and validate a site's ia.json manifest
    Discover(DiscoverArgs),
    /// List the operations a site exposes
    Endpoints(EndpointsArgs),
    /// Compute signed-key headers for a request body
    Sign(SignArgs),
    /// Check a signature against a body and timestamp
    VerifySignature(VerifySignatureArgs),
    /// Register this agent with a site (step 1 of the handshake)
    Register(RegisterArgs),
    /// Exchange a verification code for a credential (step 3)
    Verify(VerifyArgs),
    /// Print an OAuth2 authorization URL with state and PKCE
    AuthUrl(AuthUrlArgs),
    /// Invoke an operation by name
    Call(CallArgs),
}

#[derive(Args, Clone, Debug)]
pub struct SiteArgs {
    /// Site domain or URL (e.g. shop.example)
    pub domain: String,

    /// Request timeout in seconds
    #[arg(long, env = "IAJSON_TIMEOUT")]
    pub timeout: Option<u64>,
}

#[derive(Args, Clone, Debug)]
pub struct DiscoverArgs {
    #[command(flatten)]
    pub site: SiteArgs,

    /// Print the full manifest as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum TierArg {
    Public,
    Protected,
    UserRequired,
}

#[derive(Args, Clone, Debug)]
pub struct EndpointsArgs {
    #[command(flatten)]
    pub site: SiteArgs,

    /// Only list operations of this tier
    #[arg(long, value_enum)]
    pub tier: Option<TierArg>,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum AlgorithmArg {
    #[default]
    Sha256,
    Sha512,
}

#[derive(Args, Clone, Debug)]
pub struct SignArgs {
    /// API key placed in the key header
    #[arg(long, env = "IAJSON_API_KEY")]
    pub api_key: String,

    #[arg(long, env = "IAJSON_SECRET", hide_env_values = true)]
    pub secret: String,

    /// Exact request body (empty for bodiless requests)
    #[arg(long, default_value = "")]
    pub body: String,

    /// Unix timestamp (default: now)
    #[arg(long)]
    pub timestamp: Option<i64>,

    #[arg(long, value_enum, default_value_t = AlgorithmArg::Sha256)]
    pub algorithm: AlgorithmArg,

    #[arg(long, default_value = "X-IA-")]
    pub header_prefix: String,
}

#[derive(Args, Clone, Debug)]
pub struct VerifySignatureArgs {
    #[arg(long, env = "IAJSON_SECRET", hide_env_values = true)]
    pub secret: String,

    /// Hex signature to check
    #[arg(long)]
    pub signature: String,

    #[arg(long)]
    pub timestamp: i64,

    #[arg(long, default_value = "")]
    pub body: String,

    #[arg(long, value_enum, default_value_t = AlgorithmArg::Sha256)]
    pub algorithm: AlgorithmArg,

    /// Replay window in seconds (default: IAJSON_REPLAY_WINDOW or 60)
    #[arg(long)]
    pub max_age: Option<u64>,
}

#[derive(Args, Clone, Debug)]
pub struct RegisterArgs {
    #[command(flatten)]
    pub site: SiteArgs,

    /// Agent name
    #[arg(long)]
    pub name: String,

    /// Agent's own domain
    #[arg(long)]
    pub agent_domain: String,

    /// Webhook that receives the verification code
    #[arg(long)]
    pub webhook_url: String,

    /// Contact address
    #[arg(long)]
    pub contact: String,

    #[arg(long)]
    pub description: Option<String>,
}

#[derive(Args, Clone, Debug)]
pub struct VerifyArgs {
    #[command(flatten)]
    pub site: SiteArgs,

    /// Code delivered to the webhook
    #[arg(long)]
    pub code: String,

    /// Override the verification URL (default: register_url with its last segment replaced by verify)
    #[arg(long)]
    pub verify_url: Option<String>,
}

#[derive(Args, Clone, Debug)]
pub struct AuthUrlArgs {
    #[command(flatten)]
    pub site: SiteArgs,

    #[arg(long, env = "IAJSON_CLIENT_ID")]
    pub client_id: String,

    #[arg(long)]
    pub redirect_uri: String,

    /// Requested scope (repeatable; default: all declared scopes)
    #[arg(long = "scope")]
    pub scopes: Vec<String>,

    #[arg(long)]
    pub state: Option<String>,
}

#[derive(Args, Clone, Debug)]
pub struct CallArgs {
    #[command(flatten)]
    pub site: SiteArgs,

    /// Operation name
    pub operation: String,

    /// Parameter as key=value (repeatable; value parsed as JSON when possible)
    #[arg(short, long = "param", value_name = "KEY=VALUE")]
    pub params: Vec<String>,

    /// Parameters as a JSON object (merged before --param)
    #[arg(long, value_name = "JSON")]
    pub json_params: Option<String>,

    /// Bearer token for user_required operations
    #[arg(long, env = "IAJSON_ACCESS_TOKEN", hide_env_values = true)]
    pub access_token: Option<String>,

    /// Print the prepared request instead of sending it
    #[arg(long)]
    pub dry_run: bool,
}
