use folio_core::Profile;

pub const CHAT_JS: &str = include_str!("../assets/chat.js");
pub const CHAT_CSS: &str = include_str!("../assets/chat.css");

const INDEX_TEMPLATE: &str = include_str!("../assets/index.html");

pub fn render_index(profile: &Profile) -> String {
    INDEX_TEMPLATE
        .replace("{{ owner_name }}", &escape_html(&profile.owner_name))
        .replace(
            "{{ initial_message_json }}",
            &json_for_script(&profile.greeting),
        )
}

/// JSON string literal safe to embed inside a `<script>` element.
fn json_for_script(value: &str) -> String {
    serde_json::Value::String(value.to_string())
        .to_string()
        .replace('<', "\\u003c")
        .replace('>', "\\u003e")
        .replace('&', "\\u0026")
}

fn escape_html(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}
