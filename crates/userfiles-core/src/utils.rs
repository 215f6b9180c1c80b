/// Split a delimited list, trimming entries and dropping empty ones and duplicates.
///
/// Order of first occurrence is preserved.
pub fn explode_and_clean(value: &str, delimiter: char) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for item in value.split(delimiter).map(str::trim) {
        if item.is_empty() || out.iter().any(|existing| existing == item) {
            continue;
        }
        out.push(item.to_string());
    }
    out
}
