//! Topic naming.
//!
//! Topics are derived from the `mqtt.topic_format` template by substituting
//! `{id}` and `{attribute}`. `{{` and `}}` produce literal braces.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TopicError {
    #[error("Unknown placeholder '{{{name}}}' in topic format '{template}'")]
    UnknownPlaceholder { name: String, template: String },

    #[error("Unbalanced brace at offset {offset} in topic format '{template}'")]
    UnbalancedBrace { offset: usize, template: String },
}

/// Builds the topic for one `attribute` of the sensor identified by
/// `mqtt_id`.
pub fn topic_for(attribute: &str, mqtt_id: &str, template: &str) -> Result<String, TopicError> {
    let mut topic = String::with_capacity(template.len() + mqtt_id.len() + attribute.len());
    let mut chars = template.char_indices().peekable();

    while let Some((offset, c)) = chars.next() {
        match c {
            '{' if chars.peek().is_some_and(|&(_, next)| next == '{') => {
                chars.next();
                topic.push('{');
            }
            '{' => {
                let mut name = String::new();
                let mut closed = false;
                for (_, c) in chars.by_ref() {
                    match c {
                        '}' => {
                            closed = true;
                            break;
                        }
                        '{' => break,
                        _ => name.push(c),
                    }
                }
                if !closed {
                    return Err(TopicError::UnbalancedBrace {
                        offset,
                        template: template.to_string(),
                    });
                }

                match name.as_str() {
                    "id" => topic.push_str(mqtt_id),
                    "attribute" => topic.push_str(attribute),
                    _ => {
                        return Err(TopicError::UnknownPlaceholder {
                            name,
                            template: template.to_string(),
                        })
                    }
                }
            }
            '}' if chars.peek().is_some_and(|&(_, next)| next == '}') => {
                chars.next();
                topic.push('}');
            }
            '}' => {
                return Err(TopicError::UnbalancedBrace {
                    offset,
                    template: template.to_string(),
                })
            }
            _ => topic.push(c),
        }
    }

    Ok(topic)
}
