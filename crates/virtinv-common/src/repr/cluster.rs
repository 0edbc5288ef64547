use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::custom_fields::{self, CustomFields};
use crate::error::ValidationErrors;
use crate::links::ViewName;
use crate::model::{Cluster, Kind};
use crate::repr::external::NestedSite;
use crate::repr::{
    NestedClusterGroup, NestedClusterType, Payload, ReprContext, Represent, Writable, WriteMode,
};

pub const MAX_NAME_LEN: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NestedCluster {
    pub id: u64,
    pub url: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterRepr {
    pub id: u64,
    pub url: String,
    pub name: String,
    #[serde(rename = "type")]
    pub cluster_type: NestedClusterType,
    pub group: Option<NestedClusterGroup>,
    pub site: Option<NestedSite>,
    pub comments: String,
    pub custom_fields: CustomFields,
    pub created: NaiveDate,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WritableCluster {
    pub name: String,
    pub cluster_type: u64,
    pub group: Option<u64>,
    pub site: Option<u64>,
    pub comments: String,
    pub custom_fields: CustomFields,
}

impl Represent for Cluster {
    type Nested = NestedCluster;
    type Full = ClusterRepr;

    fn to_nested(&self, ctx: &ReprContext<'_>) -> NestedCluster {
        NestedCluster {
            id: self.id,
            url: ctx.links.detail(ViewName::Cluster, self.id),
            name: self.name.clone(),
        }
    }

    fn to_full(&self, ctx: &ReprContext<'_>) -> ClusterRepr {
        ClusterRepr {
            id: self.id,
            url: ctx.links.detail(ViewName::Cluster, self.id),
            name: self.name.clone(),
            cluster_type: self.cluster_type.to_nested(ctx),
            group: self.group.as_ref().map(|g| g.to_nested(ctx)),
            site: self.site.as_ref().map(|s| s.to_nested(ctx.links)),
            comments: self.comments.clone(),
            custom_fields: custom_fields::merge_for_read(
                ctx.custom_fields,
                Kind::Cluster,
                &self.custom_fields,
            ),
            created: self.created,
            last_updated: self.last_updated,
        }
    }
}

impl Writable for WritableCluster {
    type Entity = Cluster;

    fn from_payload(
        payload: &Value,
        mode: WriteMode<'_, Cluster>,
        ctx: &ReprContext<'_>,
    ) -> Result<Self, ValidationErrors> {
        let base = mode.patch_base();
        let mut p = Payload::new(payload, mode.is_partial())?;

        let name = p.required_str("name", MAX_NAME_LEN, base.map(|b| b.name.as_str()));
        let cluster_type = p.required_ref("type", base.map(|b| b.cluster_type.id));
        let group = p.optional_ref("group", base.map(|b| b.group.as_ref().map(|g| g.id)));
        let site = p.optional_ref("site", base.map(|b| b.site.as_ref().map(|s| s.id)));
        let comments = p.text("comments", None, base.map(|b| b.comments.as_str()));
        let custom_fields = match custom_fields::merge_for_write(
            ctx.custom_fields,
            Kind::Cluster,
            p.get("custom_fields"),
            mode.instance().map(|i| &i.custom_fields),
        ) {
            Ok(cf) => cf,
            Err(e) => {
                p.reject(e);
                CustomFields::new()
            }
        };

        p.finish(Self {
            name,
            cluster_type,
            group,
            site,
            comments,
            custom_fields,
        })
    }
}

impl From<&Cluster> for WritableCluster {
    fn from(cluster: &Cluster) -> Self {
        Self {
            name: cluster.name.clone(),
            cluster_type: cluster.cluster_type.id,
            group: cluster.group.as_ref().map(|g| g.id),
            site: cluster.site.as_ref().map(|s| s.id),
            comments: cluster.comments.clone(),
            custom_fields: cluster.custom_fields.clone(),
        }
    }
}
