//! Per-session accumulation of macro values sent ahead of domain commands.

use oxmilter_common::commands::Macro;

/// Insertion-ordered `symbol -> value` map, persisted for the lifetime of a
/// session.
///
/// Braced (`{auth_authen}`) and single-byte (`j`) symbol names are
/// normalized to the same key on insert, matching how an MTA may send
/// either form depending on the macro. The accumulator is never cleared
/// between stages: a later stage sees everything defined for earlier ones,
/// with later re-definitions overwriting earlier values.
#[derive(Debug, Clone, Default)]
pub struct MacroAccumulator {
    entries: Vec<(String, String)>,
}

impl MacroAccumulator {
    /// Start with no macros recorded.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the symbols carried by a `define-macro` command.
    pub fn ingest(&mut self, macro_: &Macro) {
        for (raw_key, raw_value) in macro_.macros() {
            let key = normalize_symbol(raw_key);
            let value = String::from_utf8_lossy(raw_value).into_owned();
            match self.entries.iter_mut().find(|(k, _)| *k == key) {
                Some(entry) => entry.1 = value,
                None => self.entries.push((key, value)),
            }
        }
    }

    /// Take a shallow copy of the current contents to attach to the next
    /// domain command.
    #[must_use]
    pub fn snapshot(&self) -> MacroSnapshot {
        MacroSnapshot(self.entries.clone())
    }
}

/// A point-in-time copy of a [`MacroAccumulator`], handed to application
/// hooks alongside the domain command it was attached to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MacroSnapshot(Vec<(String, String)>);

impl MacroSnapshot {
    /// Look up a symbol by its normalized name (braces optional).
    #[must_use]
    pub fn get(&self, symbol: &str) -> Option<&str> {
        let symbol = normalize_symbol(symbol.as_bytes());
        self.0
            .iter()
            .find(|(k, _)| *k == symbol)
            .map(|(_, v)| v.as_str())
    }

    /// Iterate the macros in the order they were first defined.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Whether no macros have been recorded yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

fn normalize_symbol(raw: &[u8]) -> String {
    let text = String::from_utf8_lossy(raw);
    text.strip_prefix('{')
        .and_then(|rest| rest.strip_suffix('}'))
        .unwrap_or(&text)
        .to_string()
}

#[cfg(test)]
mod test {
    use super::*;
    use bytes::BytesMut;
    use oxmilter_common::decoding::ClientCommand;
    use pretty_assertions::assert_eq;

    fn macro_cmd(code: u8, pairs: &[(&str, &str)]) -> Macro {
        let mut buffer = BytesMut::new();
        // Leading byte dispatches to the `Macro` variant; the next byte is
        // the stage code the macros belong to.
        buffer.extend_from_slice(&[b'D', code]);
        for (k, v) in pairs {
            buffer.extend_from_slice(k.as_bytes());
            buffer.extend_from_slice(b"\0");
            buffer.extend_from_slice(v.as_bytes());
            buffer.extend_from_slice(b"\0");
        }
        match ClientCommand::parse(buffer).expect("valid macro fixture") {
            ClientCommand::Macro(macro_) => macro_,
            other => panic!("expected a Macro command, got {other:?}"),
        }
    }

    #[test]
    fn normalizes_braced_and_bare_symbols_to_the_same_key() {
        let mut acc = MacroAccumulator::new();
        acc.ingest(&macro_cmd(b'C', &[("{auth_authen}", "alice")]));
        acc.ingest(&macro_cmd(b'C', &[("auth_authen", "bob")]));

        let snapshot = acc.snapshot();
        assert_eq!(snapshot.get("auth_authen"), Some("bob"));
        assert_eq!(snapshot.get("{auth_authen}"), Some("bob"));
        assert_eq!(snapshot.iter().count(), 1);
    }

    #[test]
    fn persists_and_accumulates_across_stages() {
        let mut acc = MacroAccumulator::new();
        acc.ingest(&macro_cmd(b'M', &[("{auth_authen}", "alice")]));
        let mail_snapshot = acc.snapshot();
        assert_eq!(mail_snapshot.get("auth_authen"), Some("alice"));

        acc.ingest(&macro_cmd(b'R', &[("i", "ABCD")]));
        let rcpt_snapshot = acc.snapshot();
        assert_eq!(rcpt_snapshot.get("auth_authen"), Some("alice"));
        assert_eq!(rcpt_snapshot.get("i"), Some("ABCD"));
    }
}
