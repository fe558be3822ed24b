/// Renders a value for logs or API error bodies with secrets redacted.
///
/// Anything holding a credential (tokens, OAuth secrets, DB passwords) must
/// implement this instead of relying on `Debug`/`Display`, which tend to leak
/// the whole struct verbatim.
pub trait SafeDisplay {
    fn to_safe_string(&self) -> String;

    fn to_safe_string_indented(&self) -> String {
        self.to_safe_string()
            .lines()
            .map(|line| format!("  {line}"))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
