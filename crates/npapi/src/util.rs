/// Decodes the HTML entities the remote service uses in display names.
///
/// Handles the named entities seen in live payloads plus decimal and hex
/// numeric references. Unknown or unterminated references pass through
/// unchanged.
pub(crate) fn decode_html_entities(input: &str) -> String {
    let mut output = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find('&') {
        output.push_str(&rest[..start]);
        let tail = &rest[start..];
        match tail[1..].find(';') {
            // +2: skip the '&' and the ';'
            Some(end) => match decode_entity(&tail[1..end + 1]) {
                Some(decoded) => {
                    output.push_str(&decoded);
                    rest = &tail[end + 2..];
                }
                None => {
                    output.push('&');
                    rest = &tail[1..];
                }
            },
            None => {
                output.push_str(tail);
                return output;
            }
        }
    }

    output.push_str(rest);
    output
}

fn decode_entity(name: &str) -> Option<String> {
    match name {
        "amp" => Some("&".to_string()),
        "lt" => Some("<".to_string()),
        "gt" => Some(">".to_string()),
        "quot" => Some("\"".to_string()),
        "apos" => Some("'".to_string()),
        "nbsp" => Some(" ".to_string()),
        _ => {
            let digits = name.strip_prefix('#')?;
            let code = match digits.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => digits.parse::<u32>().ok()?,
            };
            char::from_u32(code).map(String::from)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_named_entities() {
        assert_eq!(
            decode_html_entities("Alice &amp; Bob&#39;s &quot;Empire&quot;"),
            "Alice & Bob's \"Empire\""
        );
        assert_eq!(decode_html_entities("&lt;hidden&gt;"), "<hidden>");
    }

    #[test]
    fn decodes_numeric_references() {
        assert_eq!(decode_html_entities("tick &#8594; tock"), "tick \u{2192} tock");
        assert_eq!(decode_html_entities("&#x41;lpha"), "Alpha");
    }

    #[test]
    fn passes_through_plain_and_unknown_text() {
        assert_eq!(decode_html_entities("Andromeda"), "Andromeda");
        assert_eq!(decode_html_entities("fish &chips; stand"), "fish &chips; stand");
        assert_eq!(decode_html_entities("dangling &amp"), "dangling &amp");
    }
}
