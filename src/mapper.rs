//! Bidirectional field mapping between primary modules and mirror items.
//!
//! The mapper is pure: the reference index is fetched once per pass by the
//! orchestrator and handed in. Category and tag names resolve to mirror
//! reference ids on the way out and back to display names on the way in; a
//! name or id with no counterpart is a `Mapping` error, never silently
//! dropped. Fields that exist on only one side (`status`, `enrichment`,
//! `mirror_id` on the primary; nothing today on the mirror) do not cross.

use crate::cms::model::{CategoryRef, MirrorFields, MirrorModule, TagRef};
use crate::model::{Module, ModuleDraft, RefKind, SyncError};

/// Name↔id lookup tables for the mirror's reference collections.
#[derive(Debug, Clone, Default)]
pub struct ReferenceIndex {
    categories: Vec<CategoryRef>,
    tags: Vec<TagRef>,
}

impl ReferenceIndex {
    pub fn new(categories: Vec<CategoryRef>, tags: Vec<TagRef>) -> Self {
        Self { categories, tags }
    }

    fn category_id(&self, name: &str) -> Option<&str> {
        self.categories
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.id.as_str())
    }

    fn category_name(&self, id: &str) -> Option<&str> {
        self.categories
            .iter()
            .find(|c| c.id == id)
            .map(|c| c.name.as_str())
    }

    fn tag_id(&self, name: &str) -> Option<&str> {
        self.tags.iter().find(|t| t.name == name).map(|t| t.id.as_str())
    }

    fn tag_name(&self, id: &str) -> Option<&str> {
        self.tags.iter().find(|t| t.id == id).map(|t| t.name.as_str())
    }
}

pub struct FieldMapper {
    index: ReferenceIndex,
}

impl FieldMapper {
    pub fn new(index: ReferenceIndex) -> Self {
        Self { index }
    }

    /// Primary → mirror. Resolves the category and every tag to reference
    /// ids; duplicate tags collapse (set semantics, first-seen order kept
    /// for display).
    pub fn to_mirror_fields(&self, module: &Module) -> Result<MirrorFields, SyncError> {
        let category = self
            .index
            .category_id(&module.category)
            .ok_or_else(|| SyncError::Mapping {
                kind: RefKind::Category,
                name: module.category.clone(),
            })?
            .to_string();

        let mut tag_ids: Vec<String> = Vec::with_capacity(module.tags.len());
        for tag in &module.tags {
            let id = self.index.tag_id(tag).ok_or_else(|| SyncError::Mapping {
                kind: RefKind::Tag,
                name: tag.clone(),
            })?;
            if !tag_ids.iter().any(|existing| existing == id) {
                tag_ids.push(id.to_string());
            }
        }

        Ok(MirrorFields {
            slug: module.slug.clone(),
            title: module.title.clone(),
            summary: module.summary.clone(),
            body: module.body.clone(),
            category: Some(category),
            tags: tag_ids,
        })
    }

    /// Mirror → primary. Resolves reference ids back to display names. An
    /// unknown id is a `Mapping` error for the same reason as the forward
    /// direction: an unresolvable reference must not overwrite content.
    pub fn to_primary_fields(&self, item: &MirrorModule) -> Result<ModuleDraft, SyncError> {
        let category = match &item.category {
            Some(id) => self
                .index
                .category_name(id)
                .ok_or_else(|| SyncError::Mapping {
                    kind: RefKind::Category,
                    name: id.clone(),
                })?
                .to_string(),
            None => String::new(),
        };

        let mut tags: Vec<String> = Vec::with_capacity(item.tags.len());
        for id in &item.tags {
            let name = self.index.tag_name(id).ok_or_else(|| SyncError::Mapping {
                kind: RefKind::Tag,
                name: id.clone(),
            })?;
            if !tags.iter().any(|existing| existing == name) {
                tags.push(name.to_string());
            }
        }

        Ok(ModuleDraft {
            slug: item.slug.clone(),
            title: item.title.clone(),
            category,
            tags,
            summary: item.summary.clone(),
            body: item.body.clone(),
        })
    }
}
