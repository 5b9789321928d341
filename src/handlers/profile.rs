//! Account profiles: registration, per-app usernames and personal metadata

use bson::{doc, Bson, Document};
use tracing::{debug, warn};

use super::args::{AccountRef, NewAccount, NewUsername, UpdateMeta};
use super::ActionContext;
use crate::db::schemas::ProfileDoc;
use crate::db::{decode, encode, to_bson, Model};
use crate::types::Result;
use crate::undo::Mutator;

#[derive(Clone)]
pub struct ProfileHandler {
    mutator: Mutator,
}

impl ProfileHandler {
    pub fn new(mutator: Mutator) -> Self {
        Self { mutator }
    }

    async fn load(&self, user_id: &str) -> Result<Option<ProfileDoc>> {
        self.mutator
            .store()
            .find_one(Model::Profile, ProfileDoc::filter(user_id))
            .await?
            .map(decode)
            .transpose()
    }

    /// `newaccount`: register a profile at block time
    pub async fn create(&self, ctx: &ActionContext<'_>) -> Result<()> {
        let args: NewAccount = ctx.args()?;
        if self.load(&args.name).await?.is_some() {
            debug!(user = %args.name, "Profile already exists");
            return Ok(());
        }
        let profile = ProfileDoc::new(args.name.clone(), ctx.block.block_time_bson());
        self.mutator
            .create(ctx.block, Model::Profile, encode(&profile)?)
            .await?;
        debug!(user = %args.name, creator = %args.creator, "Profile created");
        Ok(())
    }

    /// `newusername`: username of `owner` inside the creator's app
    pub async fn set_username(&self, ctx: &ActionContext<'_>) -> Result<()> {
        let args: NewUsername = ctx.args()?;
        let Some(profile) = self.load(&args.owner).await? else {
            warn!(user = %args.owner, "Username for unknown profile ignored");
            return Ok(());
        };

        let mut usernames = profile.usernames;
        usernames.insert(args.creator.clone(), args.name.clone());
        self.mutator
            .update(
                ctx.block,
                Model::Profile,
                ProfileDoc::filter(&args.owner),
                doc! { "$set": { "usernames": to_bson(&usernames)? } },
            )
            .await?;
        Ok(())
    }

    /// `updatemeta`: merge personal fields for the action's app; `null` clears a field
    pub async fn update_meta(&self, ctx: &ActionContext<'_>) -> Result<()> {
        let args: UpdateMeta = ctx.args()?;
        let Some(profile) = self.load(&args.account).await? else {
            warn!(user = %args.account, "Metadata for unknown profile ignored");
            return Ok(());
        };

        let mut personal = profile.personal;
        let app = personal.entry(ctx.community_id.clone()).or_default();
        merge_meta(app, &args.meta)?;

        self.mutator
            .update(
                ctx.block,
                Model::Profile,
                ProfileDoc::filter(&args.account),
                doc! { "$set": { "personal": to_bson(&personal)? } },
            )
            .await?;
        Ok(())
    }

    /// `deletemeta`: drop personal fields for the action's app
    pub async fn delete_meta(&self, ctx: &ActionContext<'_>) -> Result<()> {
        let args: AccountRef = ctx.args()?;
        let Some(profile) = self.load(&args.account).await? else {
            return Ok(());
        };

        let mut personal = profile.personal;
        if personal.remove(&ctx.community_id).is_none() {
            return Ok(());
        }
        self.mutator
            .update(
                ctx.block,
                Model::Profile,
                ProfileDoc::filter(&args.account),
                doc! { "$set": { "personal": to_bson(&personal)? } },
            )
            .await?;
        Ok(())
    }
}

fn merge_meta(target: &mut Document, meta: &serde_json::Value) -> Result<()> {
    let Some(fields) = meta.as_object() else {
        return Ok(());
    };
    for (key, value) in fields {
        match to_bson(value)? {
            Bson::Null => {
                target.remove(key);
            }
            value => {
                target.insert(key.clone(), value);
            }
        }
    }
    Ok(())
}
