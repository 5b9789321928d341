//! Community settings map

use bson::{doc, Bson, Document};
use serde_json::Value as JsonValue;
use tracing::{debug, warn};

use super::args::SetParams;
use super::ActionContext;
use crate::db::schemas::{CommunityDoc, SettingChange};
use crate::db::{decode, encode, to_bson, Model};
use crate::types::Result;
use crate::undo::Mutator;

#[derive(Clone)]
pub struct CommunitySettingsHandler {
    mutator: Mutator,
}

impl CommunitySettingsHandler {
    pub fn new(mutator: Mutator) -> Self {
        Self { mutator }
    }

    /// `setparams`: merge the action's `[name, value]` pairs
    pub async fn set(&self, ctx: &ActionContext<'_>) -> Result<()> {
        let args: SetParams = ctx.args()?;
        let changes = parse_changes(&args.params)?;
        self.apply(ctx, &ctx.community_id, &changes).await
    }

    /// Merge settings into a community, creating it on first use
    pub async fn apply(
        &self,
        ctx: &ActionContext<'_>,
        community_id: &str,
        changes: &[SettingChange],
    ) -> Result<()> {
        if changes.is_empty() {
            return Ok(());
        }
        let existing: Option<CommunityDoc> = self
            .mutator
            .store()
            .find_one(Model::Community, CommunityDoc::filter(community_id))
            .await?
            .map(decode)
            .transpose()?;

        match existing {
            Some(community) => {
                let mut settings = community.settings;
                merge(&mut settings, changes);
                self.mutator
                    .update(
                        ctx.block,
                        Model::Community,
                        CommunityDoc::filter(community_id),
                        doc! { "$set": { "settings": settings } },
                    )
                    .await?;
            }
            None => {
                let mut settings = Document::new();
                merge(&mut settings, changes);
                let community = CommunityDoc {
                    _id: None,
                    community_id: community_id.to_string(),
                    settings,
                    subscribers: Default::default(),
                };
                self.mutator
                    .create(ctx.block, Model::Community, encode(&community)?)
                    .await?;
            }
        }
        debug!(community = community_id, changes = changes.len(), "Community settings updated");
        Ok(())
    }
}

fn merge(settings: &mut Document, changes: &[SettingChange]) {
    for change in changes {
        settings.insert(change.name.clone(), change.value.clone());
    }
}

/// Read settings pairs given as `[name, value]` or `{"name", "value"}`
pub fn parse_changes(params: &[JsonValue]) -> Result<Vec<SettingChange>> {
    let mut changes = Vec::with_capacity(params.len());
    for param in params {
        let pair = match param {
            JsonValue::Array(items) if items.len() == 2 => {
                items[0].as_str().map(|name| (name, items[1].clone()))
            }
            JsonValue::Object(fields) => fields.get("name").and_then(JsonValue::as_str).map(|name| {
                (name, fields.get("value").cloned().unwrap_or(JsonValue::Null))
            }),
            _ => None,
        };
        let Some((name, value)) = pair else {
            warn!(param = %param, "Skipping malformed settings parameter");
            continue;
        };
        let value = match to_bson(&value)? {
            Bson::Null => continue,
            value => value,
        };
        changes.push(SettingChange {
            name: name.to_string(),
            value,
        });
    }
    Ok(changes)
}
