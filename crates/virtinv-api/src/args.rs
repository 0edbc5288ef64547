use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Args {
    #[arg(long, env = "VIRTINV_ADDR", default_value = "0.0.0.0:18080")]
    pub listen_addr: String,

    /// API root used when building object URLs.
    #[arg(long, env = "VIRTINV_BASE_URL", default_value = "http://127.0.0.1:18080/api/")]
    pub base_url: String,

    /// Derive `primary_ip` from the IPv4 primary when both families are set.
    #[arg(long, env = "VIRTINV_PREFER_IPV4", default_value_t = false)]
    pub prefer_ipv4: bool,

    /// JSON file with custom field definitions keyed by resource kind.
    #[arg(long, env = "VIRTINV_CUSTOM_FIELDS")]
    pub custom_fields: Option<PathBuf>,

    /// JSON file with sites, roles, platforms, tenants, IP addresses and VLANs.
    #[arg(long, env = "VIRTINV_FIXTURES")]
    pub fixtures: Option<PathBuf>,

    #[arg(long, env = "VIRTINV_LOG_FORMAT", default_value = "text", value_parser = ["text", "compact"])]
    pub log_format: String,

    #[arg(long, env = "VIRTINV_PAGE_SIZE", default_value_t = 50)]
    pub page_size: usize,

    #[arg(long, env = "VIRTINV_MAX_PAGE_SIZE", default_value_t = 1000)]
    pub max_page_size: usize,
}
