use crate::application::ports::local_store::LocalStore;
use crate::domain::entities::{
    CachedMessage, CachedPost, CachedStory, MessageReconciliation, ProvisionalEcho,
};
use crate::domain::value_objects::ConversationId;
use crate::shared::error::AppError;
use std::sync::Arc;
use std::time::Duration;

/// 取得したサーバーの正データでキャッシュを上書きする。サーバーが常に勝つ。
pub struct Reconciler {
    store: Arc<dyn LocalStore>,
    echo_match_window: Duration,
}

impl Reconciler {
    pub fn new(store: Arc<dyn LocalStore>, echo_match_window: Duration) -> Self {
        Self {
            store,
            echo_match_window,
        }
    }

    /// 会話の取得結果を反映する。取得範囲に無いローカル行はそのまま残る。
    pub async fn reconcile_messages(
        &self,
        user_a: &str,
        user_b: &str,
        fetched: Vec<CachedMessage>,
    ) -> Result<MessageReconciliation, AppError> {
        let plan = self.plan_messages(user_a, user_b, fetched).await?;
        self.apply_messages(user_a, user_b, &plan).await?;
        Ok(plan)
    }

    /// 現在の仮 ID 行を読み、書き込みはせずに計画だけ立てる
    pub async fn plan_messages(
        &self,
        user_a: &str,
        user_b: &str,
        fetched: Vec<CachedMessage>,
    ) -> Result<MessageReconciliation, AppError> {
        let echoes = self.store.provisional_echoes(user_a, user_b).await?;
        Ok(plan_message_reconciliation(
            fetched,
            &echoes,
            self.echo_match_window,
        ))
    }

    pub async fn apply_messages(
        &self,
        user_a: &str,
        user_b: &str,
        plan: &MessageReconciliation,
    ) -> Result<(), AppError> {
        self.store.apply_message_reconciliation(plan).await?;

        tracing::debug!(
            target: "offline::reconcile",
            conversation = %ConversationId::for_pair(user_a, user_b),
            upserts = plan.upserts.len(),
            superseded = plan.superseded.len(),
            "conversation reconciled"
        );
        Ok(())
    }

    /// フィードは行単位で丸ごと置き換える
    pub async fn reconcile_feed(&self, posts: Vec<CachedPost>) -> Result<usize, AppError> {
        self.store.upsert_posts(&posts).await?;
        tracing::debug!(target: "offline::reconcile", posts = posts.len(), "feed reconciled");
        Ok(posts.len())
    }

    /// 作者のアクティブなストーリー全体を置き換え、含まれないものは削除する
    pub async fn reconcile_stories(
        &self,
        author_id: &str,
        stories: Vec<CachedStory>,
    ) -> Result<usize, AppError> {
        self.store
            .replace_stories_for_author(author_id, &stories)
            .await?;
        Ok(stories.len())
    }
}

/// 取得結果と仮 ID 行を突き合わせる。
///
/// 照合順: 相関トークンの一致 → 送信完了時に記録したサーバー ID →
/// 送受信者・本文が同じで時刻差が `window` 以内のもの（近い順、各エコー 1 回まで）。
pub fn plan_message_reconciliation(
    fetched: Vec<CachedMessage>,
    echoes: &[ProvisionalEcho],
    window: Duration,
) -> MessageReconciliation {
    let window_ms = i64::try_from(window.as_millis()).unwrap_or(i64::MAX);
    let mut consumed = vec![false; echoes.len()];
    let mut plan = MessageReconciliation::default();

    for mut message in fetched {
        if message.is_provisional() {
            tracing::warn!(
                target: "offline::reconcile",
                message_id = %message.message_id,
                "server returned a provisional id; ignoring row"
            );
            continue;
        }
        message.conversation_id =
            ConversationId::for_pair(&message.sender_id, &message.receiver_id);

        if let Some(index) = find_echo(&message, echoes, &consumed, window_ms) {
            consumed[index] = true;
            let echo = &echoes[index].message;
            if message.client_token.is_none() {
                message.client_token = echo.client_token.clone();
            }
            plan.superseded.push(echo.message_id.clone());
        }
        plan.upserts.push(message);
    }

    plan
}

fn find_echo(
    message: &CachedMessage,
    echoes: &[ProvisionalEcho],
    consumed: &[bool],
    window_ms: i64,
) -> Option<usize> {
    let available = || unconsumed(echoes, consumed);

    if let Some(token) = &message.client_token {
        let by_token = available()
            .find(|(_, echo)| echo.message.client_token.as_ref() == Some(token))
            .map(|(index, _)| index);
        if by_token.is_some() {
            return by_token;
        }
    }

    let by_server_id = available()
        .find(|(_, echo)| echo.delivered_server_id.as_deref() == Some(message.message_id.as_str()))
        .map(|(index, _)| index);
    if by_server_id.is_some() {
        return by_server_id;
    }

    available()
        // 別の行に結び付いたエコーは推測照合の対象外
        .filter(|(_, echo)| echo.delivered_server_id.is_none())
        .filter(|(_, echo)| match (&echo.message.client_token, &message.client_token) {
            (Some(ours), Some(theirs)) => ours == theirs,
            _ => true,
        })
        .filter(|(_, echo)| {
            echo.message.sender_id == message.sender_id
                && echo.message.receiver_id == message.receiver_id
                && echo.message.body == message.body
        })
        .map(|(index, echo)| {
            let delta = (echo.message.created_at_millis() - message.created_at_millis()).abs();
            (index, delta)
        })
        .filter(|(_, delta)| *delta <= window_ms)
        .min_by_key(|(_, delta)| *delta)
        .map(|(index, _)| index)
}

fn unconsumed<'a>(
    echoes: &'a [ProvisionalEcho],
    consumed: &'a [bool],
) -> impl Iterator<Item = (usize, &'a ProvisionalEcho)> + 'a {
    echoes
        .iter()
        .enumerate()
        .filter(move |(index, _)| !consumed[*index])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::MessageKind;
    use crate::domain::value_objects::{ClientToken, MessageId};
    use crate::shared::time::from_millis;

    const WINDOW: Duration = Duration::from_secs(120);

    fn server(id: &str, body: &str, at: i64) -> CachedMessage {
        CachedMessage::new(
            MessageId::new(id.into()).unwrap(),
            "me",
            "u2",
            body,
            MessageKind::Text,
            from_millis(at),
        )
    }

    fn echo(body: &str, at: i64, token: &ClientToken, delivered: Option<&str>) -> ProvisionalEcho {
        let message = CachedMessage::new(
            MessageId::provisional(),
            "me",
            "u2",
            body,
            MessageKind::Text,
            from_millis(at),
        )
        .with_client_token(token.clone());
        ProvisionalEcho {
            message,
            delivered_server_id: delivered.map(str::to_string),
        }
    }

    #[test]
    fn token_match_wins_over_heuristic() {
        let token = ClientToken::generate();
        let other = ClientToken::generate();
        let echoes = vec![
            echo("hi", 1_000, &other, None),
            echo("hi", 90_000, &token, None),
        ];
        let fetched = vec![server("srv-1", "hi", 1_000).with_client_token(token.clone())];

        let plan = plan_message_reconciliation(fetched, &echoes, WINDOW);
        assert_eq!(plan.superseded, vec![echoes[1].message.message_id.clone()]);
    }

    #[test]
    fn recorded_server_id_matches_even_when_body_changed() {
        let token = ClientToken::generate();
        let echoes = vec![echo("draft", 1_000, &token, Some("srv-7"))];
        let fetched = vec![server("srv-7", "edited on server", 500_000)];

        let plan = plan_message_reconciliation(fetched, &echoes, WINDOW);
        assert_eq!(plan.superseded.len(), 1);
        assert_eq!(plan.upserts[0].client_token.as_ref(), Some(&token));
    }

    #[test]
    fn heuristic_picks_nearest_echo_once() {
        let t1 = ClientToken::generate();
        let t2 = ClientToken::generate();
        let echoes = vec![echo("ok", 10_000, &t1, None), echo("ok", 50_000, &t2, None)];
        let fetched = vec![server("srv-1", "ok", 48_000), server("srv-2", "ok", 12_000)];

        let plan = plan_message_reconciliation(fetched, &echoes, WINDOW);
        assert_eq!(
            plan.superseded,
            vec![
                echoes[1].message.message_id.clone(),
                echoes[0].message.message_id.clone()
            ]
        );
    }

    #[test]
    fn heuristic_respects_window_and_fields() {
        let token = ClientToken::generate();
        let echoes = vec![echo("hello", 0, &token, None)];

        let too_late = vec![server("srv-1", "hello", 121_000)];
        assert!(plan_message_reconciliation(too_late, &echoes, WINDOW)
            .superseded
            .is_empty());

        let other_body = vec![server("srv-2", "hello!", 1_000)];
        assert!(plan_message_reconciliation(other_body, &echoes, WINDOW)
            .superseded
            .is_empty());
    }

    #[test]
    fn rows_without_echoes_are_plain_upserts() {
        let fetched = vec![server("srv-1", "a", 1), server("srv-2", "b", 2)];
        let plan = plan_message_reconciliation(fetched, &[], WINDOW);
        assert_eq!(plan.upserts.len(), 2);
        assert!(plan.superseded.is_empty());
    }

    #[test]
    fn provisional_ids_from_server_are_dropped() {
        let mut bogus = server("srv-1", "a", 1);
        bogus.message_id = MessageId::provisional();
        let plan = plan_message_reconciliation(vec![bogus], &[], WINDOW);
        assert!(plan.is_empty());
    }
}
