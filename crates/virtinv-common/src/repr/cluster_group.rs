use serde::Serialize;
use serde_json::Value;

use crate::error::ValidationErrors;
use crate::links::ViewName;
use crate::model::ClusterGroup;
use crate::repr::cluster_type::name_and_slug;
use crate::repr::{Payload, ReprContext, Represent, Writable, WriteMode};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NestedClusterGroup {
    pub id: u64,
    pub url: String,
    pub name: String,
    pub slug: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClusterGroupRepr {
    pub id: u64,
    pub url: String,
    pub name: String,
    pub slug: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WritableClusterGroup {
    pub name: String,
    pub slug: String,
}

impl Represent for ClusterGroup {
    type Nested = NestedClusterGroup;
    type Full = ClusterGroupRepr;

    fn to_nested(&self, ctx: &ReprContext<'_>) -> NestedClusterGroup {
        NestedClusterGroup {
            id: self.id,
            url: ctx.links.detail(ViewName::ClusterGroup, self.id),
            name: self.name.clone(),
            slug: self.slug.clone(),
        }
    }

    fn to_full(&self, ctx: &ReprContext<'_>) -> ClusterGroupRepr {
        ClusterGroupRepr {
            id: self.id,
            url: ctx.links.detail(ViewName::ClusterGroup, self.id),
            name: self.name.clone(),
            slug: self.slug.clone(),
        }
    }
}

impl Writable for WritableClusterGroup {
    type Entity = ClusterGroup;

    fn from_payload(
        payload: &Value,
        mode: WriteMode<'_, ClusterGroup>,
        _ctx: &ReprContext<'_>,
    ) -> Result<Self, ValidationErrors> {
        let base = mode.patch_base();
        let mut p = Payload::new(payload, mode.is_partial())?;
        let (name, slug) = name_and_slug(
            &mut p,
            base.map(|b| b.name.as_str()),
            base.map(|b| b.slug.as_str()),
        );
        p.finish(Self { name, slug })
    }
}
