//! Response template rendering.
//!
//! Templates use single-brace placeholders: `{message}` and `{sender}`.
//! `{{` and `}}` produce literal braces. Anything else inside braces is an
//! error.

/// Why a template could not be rendered.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TemplateError {
    #[error("unknown placeholder '{{{0}}}'")]
    UnknownPlaceholder(String),

    #[error("unclosed '{{' at byte {0}")]
    Unclosed(usize),

    #[error("single '}}' at byte {0}")]
    StrayClose(usize),
}

/// Placeholder used when the sender is absent or empty.
pub const UNKNOWN_SENDER: &str = "Unknown";

/// Render `template`, substituting the raw message text and the sender.
pub fn render(template: &str, message: &str, sender: Option<&str>) -> Result<String, TemplateError> {
    let sender = match sender {
        Some(s) if !s.is_empty() => s,
        _ => UNKNOWN_SENDER,
    };

    let mut out = String::with_capacity(template.len() + message.len());
    let mut chars = template.char_indices().peekable();

    while let Some((pos, c)) = chars.next() {
        match c {
            '{' => {
                if matches!(chars.peek(), Some((_, '{'))) {
                    chars.next();
                    out.push('{');
                    continue;
                }

                let mut field = String::new();
                let mut closed = false;
                for (_, fc) in chars.by_ref() {
                    if fc == '}' {
                        closed = true;
                        break;
                    }
                    field.push(fc);
                }
                if !closed {
                    return Err(TemplateError::Unclosed(pos));
                }

                match field.as_str() {
                    "message" => out.push_str(message),
                    "sender" => out.push_str(sender),
                    _ => return Err(TemplateError::UnknownPlaceholder(field)),
                }
            }
            '}' => {
                if matches!(chars.peek(), Some((_, '}'))) {
                    chars.next();
                    out.push('}');
                } else {
                    return Err(TemplateError::StrayClose(pos));
                }
            }
            _ => out.push(c),
        }
    }

    Ok(out)
}
