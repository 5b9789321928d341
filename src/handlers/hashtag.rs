//! Hashtag extraction and per-community usage counters

use bson::doc;
use tracing::debug;

use super::args::{CreateMessage, MessageRef, UpdateMessage};
use super::content::find_content;
use super::ActionContext;
use crate::db::schemas::HashtagDoc;
use crate::db::{decode, Model};
use crate::types::Result;
use crate::undo::Mutator;

#[derive(Clone)]
pub struct HashTagHandler {
    mutator: Mutator,
}

impl HashTagHandler {
    pub fn new(mutator: Mutator) -> Self {
        Self { mutator }
    }

    /// Resolve tags of new content and count them, unless the content exists
    pub async fn extract(&self, ctx: &mut ActionContext<'_>) -> Result<()> {
        let args: CreateMessage = ctx.args()?;
        ctx.tags = collect_tags(&args.tags, &args.bodymssg);

        let store = self.mutator.store();
        if find_content(store.as_ref(), &args.message_id.content_id())
            .await?
            .is_some()
        {
            debug!(content = %args.message_id.content_id(), "Content exists, tags not recounted");
            return Ok(());
        }

        let community = ctx.community_id.clone();
        for tag in ctx.tags.clone() {
            self.adjust(ctx, &community, &tag, 1).await?;
        }
        Ok(())
    }

    /// Recount by the difference between stored and updated tags
    pub async fn retag(&self, ctx: &mut ActionContext<'_>) -> Result<()> {
        let args: UpdateMessage = ctx.args()?;
        let store = self.mutator.store();
        let Some(existing) = find_content(store.as_ref(), &args.message_id.content_id()).await?
        else {
            return Ok(());
        };
        let existing = existing.into_doc();
        let old_tags = existing.content.tags;

        let new_tags = if args.tags.is_none() && args.bodymssg.is_none() {
            old_tags.clone()
        } else {
            let body = args
                .bodymssg
                .as_deref()
                .unwrap_or(&existing.content.body.full);
            collect_tags(args.tags.as_deref().unwrap_or_default(), body)
        };

        let community = existing.community_id;
        for tag in new_tags.iter().filter(|t| !old_tags.contains(t)) {
            self.adjust(ctx, &community, tag, 1).await?;
        }
        for tag in old_tags.iter().filter(|t| !new_tags.contains(t)) {
            self.adjust(ctx, &community, tag, -1).await?;
        }

        ctx.tags = new_tags;
        Ok(())
    }

    /// Uncount the tags of content about to be removed
    pub async fn release(&self, ctx: &mut ActionContext<'_>) -> Result<()> {
        let args: MessageRef = ctx.args()?;
        let store = self.mutator.store();
        let Some(existing) = find_content(store.as_ref(), &args.message_id.content_id()).await?
        else {
            return Ok(());
        };
        let existing = existing.into_doc();
        for tag in &existing.content.tags {
            self.adjust(ctx, &existing.community_id, tag, -1).await?;
        }
        Ok(())
    }

    async fn adjust(
        &self,
        ctx: &ActionContext<'_>,
        community_id: &str,
        tag: &str,
        delta: i64,
    ) -> Result<()> {
        let filter = HashtagDoc::filter(community_id, tag);
        if delta > 0 {
            self.mutator
                .upsert(ctx.block, Model::Hashtag, filter, doc! { "$inc": { "count": delta } })
                .await?;
            return Ok(());
        }

        let Some(before) = self
            .mutator
            .update(ctx.block, Model::Hashtag, filter.clone(), doc! { "$inc": { "count": delta } })
            .await?
        else {
            return Ok(());
        };
        let before: HashtagDoc = decode(before)?;
        if before.count + delta <= 0 {
            self.mutator.remove(ctx.block, Model::Hashtag, filter).await?;
        }
        Ok(())
    }
}

/// Explicit tags plus `#tag` tokens of the body, lower-cased and unique
pub fn collect_tags(explicit: &[String], body: &str) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    let mut push = |raw: &str| {
        let tag = raw.trim().trim_start_matches('#').to_lowercase();
        if !tag.is_empty() && !tags.contains(&tag) {
            tags.push(tag);
        }
    };

    for tag in explicit {
        push(tag);
    }

    let chars: Vec<char> = body.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let starts_token = chars[i] == '#' && (i == 0 || !is_tag_char(chars[i - 1]));
        if starts_token {
            let end = chars[i + 1..]
                .iter()
                .position(|c| !is_tag_char(*c))
                .map(|p| i + 1 + p)
                .unwrap_or(chars.len());
            if end > i + 1 {
                let token: String = chars[i + 1..end].iter().collect();
                push(&token);
            }
            i = end.max(i + 1);
        } else {
            i += 1;
        }
    }

    tags
}

fn is_tag_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '-'
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collect_tags() {
        let tags = collect_tags(
            &["Rust".into(), "#golos".into()],
            "Learning #rust and #Async_IO today. Not a tag: a#b, ## or #",
        );
        assert_eq!(tags, vec!["rust", "golos", "async_io"]);
    }

    #[test]
    fn test_collect_tags_unicode() {
        let tags = collect_tags(&[], "#Привет мир #тест");
        assert_eq!(tags, vec!["привет", "тест"]);
    }
}
