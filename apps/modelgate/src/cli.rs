use clap::Parser;

use modelgate_common::GatewayConfigPatch;

/// Flags win over their environment variables; anything left unset falls
/// back to the config defaults.
#[derive(Parser, Debug)]
#[command(name = "modelgate", version, about)]
pub(crate) struct Cli {
    #[arg(long, env = "MODELGATE_HOST")]
    pub(crate) host: Option<String>,
    #[arg(long, env = "MODELGATE_PORT")]
    pub(crate) port: Option<u16>,
    /// Database DSN; defaults to a sqlite file under the data dir.
    #[arg(long, env = "MODELGATE_DSN")]
    pub(crate) dsn: Option<String>,
    #[arg(long, env = "MODELGATE_DATA_DIR", default_value = "./data")]
    pub(crate) data_dir: String,
    #[arg(long, env = "MODELGATE_ADMIN_KEY")]
    pub(crate) admin_key: Option<String>,
    #[arg(long, env = "MODEL_PROVIDER_SECRET", hide_env_values = true)]
    pub(crate) provider_secret: Option<String>,
    #[arg(long, env = "MODELGATE_PROXY")]
    pub(crate) proxy: Option<String>,
    #[arg(long = "default-org-id", env = "MODELGATE_DEFAULT_ORG_ID")]
    pub(crate) default_organization_id: Option<i64>,
    #[arg(long)]
    pub(crate) stream_timeout_secs: Option<u64>,
    #[arg(long)]
    pub(crate) data_buffer: Option<usize>,
    #[arg(long)]
    pub(crate) error_buffer: Option<usize>,
    #[arg(long)]
    pub(crate) min_batch_words: Option<usize>,
}

impl Cli {
    pub(crate) fn patch(&self) -> GatewayConfigPatch {
        GatewayConfigPatch {
            host: self.host.clone(),
            port: self.port,
            admin_key: self.admin_key.clone(),
            dsn: self.dsn.clone(),
            provider_secret: self.provider_secret.clone(),
            proxy: self.proxy.clone(),
            default_organization_id: self.default_organization_id,
            stream_timeout_secs: self.stream_timeout_secs,
            data_buffer: self.data_buffer,
            error_buffer: self.error_buffer,
            min_batch_words: self.min_batch_words,
        }
    }
}
