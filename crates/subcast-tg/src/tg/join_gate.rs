use crate::broadcast::Transport;
use crate::prelude::*;
use teloxide::types::{ChatId, UserId};

/// Checks whether the user has joined the channel. Any error from Telegram
/// (e.g. the bot isn't an admin of the channel) conservatively counts as
/// "not a member".
#[instrument(skip(transport))]
pub(crate) async fn is_member(
    transport: &(impl Transport + ?Sized),
    channel: ChatId,
    user: UserId,
) -> bool {
    let kind = match transport.membership(channel, user).await {
        Ok(kind) => kind,
        Err(err) => {
            warn!(
                err = tracing_err(&err),
                "Couldn't get the channel membership, treating as not a member"
            );
            return false;
        }
    };

    debug!(?kind, "Got channel membership");

    // Restricted users may have already left the channel
    kind.is_present()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::testing::FakeTransport;
    use teloxide::types::{Banned, ChatMemberKind, Owner, Restricted, UntilDate};

    const CHANNEL: ChatId = ChatId(-100);
    const USER: UserId = UserId(7);

    fn restricted(is_member: bool) -> ChatMemberKind {
        ChatMemberKind::Restricted(Restricted {
            until_date: UntilDate::Forever,
            is_member,
            can_send_messages: false,
            can_send_media_messages: false,
            can_send_other_messages: false,
            can_add_web_page_previews: false,
            can_change_info: false,
            can_invite_users: false,
            can_pin_messages: false,
            can_manage_topics: false,
            can_send_polls: false,
        })
    }

    #[test_log::test(tokio::test)]
    async fn members_pass() {
        let transport = FakeTransport::default();

        let owner = ChatMemberKind::Owner(Owner {
            custom_title: None,
            is_anonymous: false,
        });

        for kind in [owner, ChatMemberKind::Member, restricted(true)] {
            transport.set_membership(CHANNEL, USER, kind.clone());
            assert!(is_member(&transport, CHANNEL, USER).await, "{kind:?}");
        }
    }

    #[test_log::test(tokio::test)]
    async fn non_members_are_rejected() {
        let transport = FakeTransport::default();

        let banned = ChatMemberKind::Banned(Banned {
            until_date: UntilDate::Forever,
        });

        for kind in [ChatMemberKind::Left, banned] {
            transport.set_membership(CHANNEL, USER, kind.clone());
            assert!(!is_member(&transport, CHANNEL, USER).await, "{kind:?}");
        }
    }

    #[test_log::test(tokio::test)]
    async fn restricted_user_who_left_is_rejected() {
        let transport = FakeTransport::default();
        transport.set_membership(CHANNEL, USER, restricted(false));

        assert!(!is_member(&transport, CHANNEL, USER).await);
    }

    #[test_log::test(tokio::test)]
    async fn lookup_failure_is_rejected() {
        let transport = FakeTransport::default();
        transport.set_membership(CHANNEL, UserId(8), ChatMemberKind::Member);

        assert!(!is_member(&transport, CHANNEL, USER).await);
    }
}
