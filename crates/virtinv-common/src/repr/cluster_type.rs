use serde::Serialize;
use serde_json::Value;

use crate::error::{FieldError, ValidationErrors};
use crate::links::ViewName;
use crate::model::ClusterType;
use crate::repr::{Payload, ReprContext, Represent, Writable, WriteMode};
use crate::slug::{is_valid_slug, slugify, MAX_SLUG_LEN};

pub const MAX_NAME_LEN: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NestedClusterType {
    pub id: u64,
    pub url: String,
    pub name: String,
    pub slug: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClusterTypeRepr {
    pub id: u64,
    pub url: String,
    pub name: String,
    pub slug: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WritableClusterType {
    pub name: String,
    pub slug: String,
}

impl Represent for ClusterType {
    type Nested = NestedClusterType;
    type Full = ClusterTypeRepr;

    fn to_nested(&self, ctx: &ReprContext<'_>) -> NestedClusterType {
        NestedClusterType {
            id: self.id,
            url: ctx.links.detail(ViewName::ClusterType, self.id),
            name: self.name.clone(),
            slug: self.slug.clone(),
        }
    }

    fn to_full(&self, ctx: &ReprContext<'_>) -> ClusterTypeRepr {
        ClusterTypeRepr {
            id: self.id,
            url: ctx.links.detail(ViewName::ClusterType, self.id),
            name: self.name.clone(),
            slug: self.slug.clone(),
        }
    }
}

impl Writable for WritableClusterType {
    type Entity = ClusterType;

    fn from_payload(
        payload: &Value,
        mode: WriteMode<'_, ClusterType>,
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

/// Reads `name` and `slug`, deriving the slug from the name when it is omitted.
pub(crate) fn name_and_slug(
    p: &mut Payload<'_>,
    current_name: Option<&str>,
    current_slug: Option<&str>,
) -> (String, String) {
    let name = p.required_str("name", MAX_NAME_LEN, current_name);
    let slug = match p.optional_str("slug", current_slug) {
        Some(slug) if is_valid_slug(&slug) => slug,
        Some(slug) if slug.len() > MAX_SLUG_LEN => {
            p.reject(FieldError::malformed(
                "slug",
                format!("Ensure this field has no more than {MAX_SLUG_LEN} characters."),
            ));
            String::new()
        }
        Some(_) => {
            p.reject(FieldError::malformed(
                "slug",
                "Enter a valid \"slug\" consisting of letters, numbers, underscores or hyphens.",
            ));
            String::new()
        }
        None if name.is_empty() => String::new(),
        None => {
            let derived = slugify(&name);
            if derived.is_empty() {
                p.reject(FieldError::malformed(
                    "slug",
                    "A slug could not be derived from the name; provide one.",
                ));
            }
            derived
        }
    };
    (name, slug)
}
