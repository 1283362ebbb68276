/// Renders `![label](url)` on a single line.
pub fn image_link(label: &str, url: &str) -> String {
    format!("![{}]({})", single_line(label), single_line(url.trim()))
}

fn single_line(s: &str) -> String {
    s.replace(['\r', '\n'], " ")
}
