//! Recipient address checks performed before any dispatch.

use crate::email::EmailMessage;
use lettre::message::Mailbox;

/// Accept `address` only if it parses as a mailbox whose address renders
/// back to exactly the input. Display names, angle brackets and surrounding
/// whitespace are rejected.
#[must_use]
pub fn is_valid_address(address: &str) -> bool {
    if address.is_empty() {
        return false;
    }
    address
        .parse::<Mailbox>()
        .is_ok_and(|mailbox| mailbox.email.to_string() == address)
}

/// Every recipient in `messages` that fails [`is_valid_address`], in input order.
#[must_use]
pub fn invalid_recipients(messages: &[EmailMessage]) -> Vec<String> {
    messages
        .iter()
        .filter(|m| !is_valid_address(&m.to))
        .map(|m| m.to.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_addresses() {
        assert!(is_valid_address("user@example.com"));
        assert!(is_valid_address("first.last+tag@sub.example.org"));
    }

    #[test]
    fn rejects_malformed_or_decorated_addresses() {
        for input in [
            "",
            "not-an-email",
            "@example.com",
            "user@",
            "User <user@example.com>",
            "<user@example.com>",
            " user@example.com",
            "user@example.com ",
            "a@b.com, c@d.com",
        ] {
            assert!(!is_valid_address(input), "{input:?} should be rejected");
        }
    }

    #[test]
    fn collects_every_invalid_recipient_in_order() {
        let messages = vec![
            EmailMessage::new("bad-1", "s", "b"),
            EmailMessage::new("a@x.com", "s", "b"),
            EmailMessage::new("bad-2", "s", "b"),
            EmailMessage::new("", "s", "b"),
        ];
        assert_eq!(invalid_recipients(&messages), vec!["bad-1", "bad-2", ""]);
    }
}
