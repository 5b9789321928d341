//! Posts, comments and reposts
//!
//! Content is keyed by `contentId`; a repost is a copy of the original post
//! carrying a `repost` block with the reposting account. Comment ordering
//! keys come from [`NestedOrdering`].

use bigdecimal::BigDecimal;
use bson::{doc, Bson, Document};
use tracing::{debug, warn};

use super::args::{CreateMessage, MessageRef, RepostArgs, UpdateMessage};
use super::ActionContext;
use crate::db::schemas::{
    original_post_filter, Content, ContentBody, ContentData, ContentDoc, ContentId, ContentMeta,
    ContentStats, ParentRef, Payout, PayoutMeta, PoolDoc, ProfileDoc, Repost, TokenVesting, Votes,
};
use crate::db::{decode, encode, to_bson, DocumentStore, Model};
use crate::ordering::{self, NestedOrdering};
use crate::reward::{compute_payout, PayoutInput};
use crate::types::Result;
use crate::undo::Mutator;

/// Characters kept in `content.body.preview`
pub const PREVIEW_CHARS: usize = 280;

/// Locate an original post or a comment by its natural key
pub async fn find_content(store: &dyn DocumentStore, id: &ContentId) -> Result<Option<Content>> {
    if let Some(doc) = store.find_one(Model::Post, original_post_filter(id)).await? {
        return Ok(Some(Content::Post(decode(doc)?)));
    }
    if let Some(doc) = store.find_one(Model::Comment, id.filter()).await? {
        return Ok(Some(Content::Comment(decode(doc)?)));
    }
    Ok(None)
}

/// Filter addressing exactly the stored document of `content`
pub fn content_filter(content: &Content) -> Document {
    match content {
        Content::Post(doc) => original_post_filter(&doc.content_id),
        Content::Comment(doc) => doc.content_id.filter(),
    }
}

#[derive(Clone)]
pub struct ContentHandler {
    mutator: Mutator,
    ordering: NestedOrdering,
}

impl ContentHandler {
    pub fn new(mutator: Mutator, ordering: NestedOrdering) -> Self {
        Self { mutator, ordering }
    }

    /// Create a post or comment; re-creating an existing content id is a no-op
    pub async fn create(&self, ctx: &ActionContext<'_>) -> Result<()> {
        let args: CreateMessage = ctx.args()?;
        let content_id = args.message_id.content_id();
        let store = self.mutator.store();

        if find_content(store.as_ref(), &content_id).await?.is_some() {
            debug!(content = %content_id, "Content already exists");
            return Ok(());
        }

        let mut doc = ContentDoc {
            _id: None,
            content_id: content_id.clone(),
            community_id: ctx.community_id.clone(),
            content: content_data(
                args.headermssg.clone(),
                &args.bodymssg,
                &args.jsonmetadata,
                ctx.tags.clone(),
            ),
            votes: Votes::default(),
            stats: ContentStats::default(),
            payout: Payout {
                meta: PayoutMeta {
                    benefactor_percents: args.beneficiaries.iter().map(|b| b.weight).collect(),
                    token_prop: args.tokenprop,
                    curators_percent: args.curators_prcnt,
                    ..Default::default()
                },
                ..Default::default()
            },
            meta: ContentMeta {
                time: ctx.block.block_time_bson(),
            },
            parent: None,
            ordering: None,
            nested_level: None,
            repost: None,
        };
        let (hot, trending) = crate::reward::rank(0, ctx.block.block_time);
        doc.stats.hot = hot;
        doc.stats.trending = trending;

        let parent_id = args.parent_id.filter(|p| !p.is_empty()).map(|p| p.content_id());
        let Some(parent_id) = parent_id else {
            self.mutator.create(ctx.block, Model::Post, encode(&doc)?).await?;
            self.bump_author(ctx, &content_id.user_id, "stats.postsCount", 1)
                .await?;
            return Ok(());
        };

        let token = ordering::token(ctx.block.block_time, ctx.block.action_seq);
        let parent = find_content(store.as_ref(), &parent_id).await?;
        let (parent_ref, (keys, level)) = match &parent {
            Some(Content::Post(_)) => (
                ParentRef {
                    post: Some(parent_id.clone()),
                    comment: None,
                },
                self.ordering.top_level(&token),
            ),
            Some(Content::Comment(parent_comment)) => {
                let parent_keys = parent_comment.ordering.clone().unwrap_or_default();
                let parent_level = parent_comment.nested_level.unwrap_or(1);
                (
                    ParentRef {
                        post: parent_comment.parent.as_ref().and_then(|p| p.post.clone()),
                        comment: Some(parent_id.clone()),
                    },
                    self.ordering.reply(&parent_keys, parent_level, &token),
                )
            }
            None => {
                warn!(
                    content = %content_id,
                    parent = %parent_id,
                    "Parent content not found, storing comment with parent reference only"
                );
                (
                    ParentRef {
                        post: None,
                        comment: Some(parent_id.clone()),
                    },
                    self.ordering.top_level(&token),
                )
            }
        };

        doc.parent = Some(parent_ref.clone());
        doc.ordering = Some(keys);
        doc.nested_level = Some(level);
        self.mutator
            .create(ctx.block, Model::Comment, encode(&doc)?)
            .await?;

        if let Some(parent) = &parent {
            self.bump_comments(ctx, &parent_ref, 1).await?;
            debug!(content = %content_id, parent = %parent.doc().content_id, level, "Comment created");
        }
        self.bump_author(ctx, &content_id.user_id, "stats.commentsCount", 1)
            .await?;
        Ok(())
    }

    /// Replace title, body, metadata and tags
    pub async fn update(&self, ctx: &ActionContext<'_>) -> Result<()> {
        let args: UpdateMessage = ctx.args()?;
        let content_id = args.message_id.content_id();
        let Some(existing) = find_content(self.mutator.store().as_ref(), &content_id).await?
        else {
            warn!(content = %content_id, "Update of unknown content ignored");
            return Ok(());
        };

        let current = &existing.doc().content;
        let title = args.headermssg.clone().unwrap_or_else(|| current.title.clone());
        let body = args
            .bodymssg
            .clone()
            .unwrap_or_else(|| current.body.full.clone());
        let mut data = match &args.jsonmetadata {
            Some(raw) => content_data(title, &body, raw, ctx.tags.clone()),
            None => {
                let mut data = content_data(title, &body, "", ctx.tags.clone());
                data.metadata = current.metadata.clone();
                data.embeds = current.embeds.clone();
                data
            }
        };
        if args.tags.is_none() && args.bodymssg.is_none() {
            data.tags = current.tags.clone();
        }

        self.mutator
            .update(
                ctx.block,
                existing.model(),
                content_filter(&existing),
                doc! { "$set": { "content": to_bson(&data)? } },
            )
            .await?;
        Ok(())
    }

    /// Delete content and roll back the counters its creation bumped
    pub async fn remove(&self, ctx: &ActionContext<'_>) -> Result<()> {
        let args: MessageRef = ctx.args()?;
        let content_id = args.message_id.content_id();
        let Some(existing) = find_content(self.mutator.store().as_ref(), &content_id).await?
        else {
            warn!(content = %content_id, "Delete of unknown content ignored");
            return Ok(());
        };

        self.mutator
            .remove(ctx.block, existing.model(), content_filter(&existing))
            .await?;

        match &existing {
            Content::Post(_) => {
                self.bump_author(ctx, &content_id.user_id, "stats.postsCount", -1)
                    .await?;
            }
            Content::Comment(comment) => {
                if let Some(parent) = &comment.parent {
                    self.bump_comments(ctx, parent, -1).await?;
                }
                self.bump_author(ctx, &content_id.user_id, "stats.commentsCount", -1)
                    .await?;
            }
        }
        Ok(())
    }

    /// Copy an original post into the reposting account's feed
    pub async fn repost(&self, ctx: &ActionContext<'_>) -> Result<()> {
        let args: RepostArgs = ctx.args()?;
        let content_id = args.message_id.content_id();
        let store = self.mutator.store();

        let mut existing_filter = content_id.filter();
        existing_filter.insert("repost.userId", args.rebloger.as_str());
        if store.find_one(Model::Post, existing_filter).await?.is_some() {
            return Ok(());
        }

        let Some(original) = store
            .find_one(Model::Post, original_post_filter(&content_id))
            .await?
        else {
            warn!(content = %content_id, rebloger = %args.rebloger, "Repost of unknown post ignored");
            return Ok(());
        };

        let mut copy: ContentDoc = decode(original)?;
        copy._id = None;
        copy.repost = Some(Repost {
            is_repost: true,
            user_id: args.rebloger.clone(),
            time: ctx.block.block_time_bson(),
            body: Some(args.bodymssg).filter(|b| !b.is_empty()),
        });
        self.mutator
            .create(ctx.block, Model::Post, encode(&copy)?)
            .await?;
        Ok(())
    }

    pub async fn erase_repost(&self, ctx: &ActionContext<'_>) -> Result<()> {
        let args: RepostArgs = ctx.args()?;
        let mut filter = args.message_id.content_id().filter();
        filter.insert("repost.userId", args.rebloger.as_str());
        self.mutator.remove(ctx.block, Model::Post, filter).await?;
        Ok(())
    }

    /// Close the content's payout window; runs at most once per content
    pub async fn payout(&self, ctx: &ActionContext<'_>) -> Result<()> {
        let args: MessageRef = ctx.args()?;
        let content_id = args.message_id.content_id();
        let store = self.mutator.store();
        let Some(existing) = find_content(store.as_ref(), &content_id).await? else {
            warn!(content = %content_id, "Payout of unknown content ignored");
            return Ok(());
        };
        if existing.doc().payout.done {
            debug!(content = %content_id, "Payout already done");
            return Ok(());
        }

        let doc = existing.doc();
        let pool: Option<PoolDoc> = store
            .find_one(Model::Pool, PoolDoc::filter(&doc.community_id))
            .await?
            .map(decode)
            .transpose()?;
        let Some(pool) = pool else {
            warn!(community = %doc.community_id, content = %content_id, "No reward pool state, paying out zero");
            return self.store_payout(ctx, &existing, Payout {
                done: true,
                meta: doc.payout.meta.clone(),
                ..Default::default()
            }).await;
        };

        let meta = &doc.payout.meta;
        let split = compute_payout(&PayoutInput {
            funds: pool.funds,
            reward_weight: meta.reward_weight.clone(),
            shares_fn: meta.shares_fn.clone(),
            r_shares_fn: pool.r_shares_fn,
            curators_percent: meta.curators_percent,
            token_prop: meta.token_prop,
            benefactor_percents: meta.benefactor_percents.clone(),
            curator_weights: doc
                .votes
                .up_votes
                .iter()
                .map(|v| v.curator_weight.clone().unwrap_or_else(|| BigDecimal::from(0)))
                .collect(),
            sum_curator_weight: meta.sum_curator_sw.clone(),
        });

        let payout = Payout {
            done: true,
            author: TokenVesting {
                token: split.author_token,
                vesting: split.author_vesting,
            },
            curator: TokenVesting::vesting(split.actual_curation),
            benefactor: TokenVesting::vesting(split.benefactor),
            unclaimed: TokenVesting::token(split.unclaimed_curation),
            meta: meta.clone(),
        };
        debug!(content = %content_id, total = %split.total, "Payout computed");
        self.store_payout(ctx, &existing, payout).await
    }

    async fn store_payout(&self, ctx: &ActionContext<'_>, content: &Content, payout: Payout) -> Result<()> {
        let mut filter = content_filter(content);
        filter.insert("payout.done", doc! { "$ne": true });
        self.mutator
            .update(
                ctx.block,
                content.model(),
                filter,
                doc! { "$set": { "payout": to_bson(&payout)? } },
            )
            .await?;
        Ok(())
    }

    async fn bump_comments(&self, ctx: &ActionContext<'_>, parent: &ParentRef, delta: i32) -> Result<()> {
        let update = doc! { "$inc": { "stats.commentsCount": delta } };
        if let Some(post) = &parent.post {
            self.mutator
                .update(ctx.block, Model::Post, original_post_filter(post), update.clone())
                .await?;
        }
        if let Some(comment) = &parent.comment {
            self.mutator
                .update(ctx.block, Model::Comment, comment.filter(), update)
                .await?;
        }
        Ok(())
    }

    async fn bump_author(&self, ctx: &ActionContext<'_>, user_id: &str, field: &str, delta: i32) -> Result<()> {
        self.mutator
            .update(
                ctx.block,
                Model::Profile,
                ProfileDoc::filter(user_id),
                doc! { "$inc": { field: delta } },
            )
            .await?;
        Ok(())
    }
}

/// Build content data; unparsable metadata degrades to `None`
fn content_data(title: String, body: &str, raw_metadata: &str, tags: Vec<String>) -> ContentData {
    let metadata = parse_metadata(raw_metadata);
    let embeds = metadata
        .as_ref()
        .and_then(|m| m.as_document())
        .and_then(|m| m.get_array("embeds").ok())
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.as_document().cloned())
                .collect()
        })
        .unwrap_or_default();

    ContentData {
        title,
        body: ContentBody {
            full: body.to_string(),
            preview: body.chars().take(PREVIEW_CHARS).collect(),
        },
        metadata,
        tags,
        embeds,
    }
}

fn parse_metadata(raw: &str) -> Option<Bson> {
    if raw.trim().is_empty() {
        return None;
    }
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(value) => bson::to_bson(&value).ok(),
        Err(e) => {
            warn!(error = %e, "Unparsable content metadata");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_degrades_to_none() {
        assert!(parse_metadata("{not json").is_none());
        assert!(parse_metadata("").is_none());
        assert!(parse_metadata(r#"{"app": "golos"}"#).is_some());
    }

    #[test]
    fn test_embeds_from_metadata() {
        let data = content_data(
            "t".into(),
            "body",
            r#"{"embeds": [{"url": "https://x"}, 5]}"#,
            vec![],
        );
        assert_eq!(data.embeds.len(), 1);
        assert_eq!(data.body.preview, "body");
    }

    #[test]
    fn test_preview_truncates_on_chars() {
        let body = "я".repeat(PREVIEW_CHARS + 10);
        let data = content_data(String::new(), &body, "", vec![]);
        assert_eq!(data.body.preview.chars().count(), PREVIEW_CHARS);
    }
}
