use std::sync::Arc;

use virtinv_common::{CustomFieldRegistry, LinkResolver, ReprContext};
use virtinv_meta::InventoryStore;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn InventoryStore>,
    pub links: Arc<LinkResolver>,
    pub custom_fields: Arc<dyn CustomFieldRegistry>,
    pub prefer_ipv4: bool,
    pub page_size: usize,
    pub max_page_size: usize,
}

impl AppState {
    pub fn repr_ctx(&self) -> ReprContext<'_> {
        ReprContext {
            links: &self.links,
            custom_fields: self.custom_fields.as_ref(),
            prefer_ipv4: self.prefer_ipv4,
        }
    }

    /// Effective page size: absent means the default, zero means the maximum.
    pub fn page_limit(&self, requested: Option<usize>) -> usize {
        match requested {
            None => self.page_size.min(self.max_page_size),
            Some(0) => self.max_page_size,
            Some(n) => n.min(self.max_page_size),
        }
    }
}
