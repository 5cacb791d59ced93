//! Search result formatter: pure conversion of a structured search
//! response into platform-message fragments.

use crate::search::SearchResponse;

/// Render a search response as an ordered list of display fragments.
///
/// The first fragment is the "found N results" header (with an appended
/// error line when the response carried one); each following fragment is
/// one result group, documents joined with blank lines.
pub fn format_search_result(response: &SearchResponse) -> Vec<String> {
    let mut header = response.found_human.clone();
    if let Some(error) = &response.error {
        header.push_str(&format!(
            "\nВо время поиска произошла ошибка #{}: {}",
            error.code, error.message
        ));
    }

    let mut fragments = vec![header];

    for group in &response.groups {
        let docs: Vec<String> = group
            .iter()
            .map(|doc| {
                let title = doc.title.replace("**", "");
                let cached_url = doc
                    .saved_copy_url
                    .as_ref()
                    .map(|url| format!(" ([кеш]({url}))"))
                    .unwrap_or_default();
                let extended = doc
                    .extended_text
                    .as_ref()
                    .map(|text| format!("> {text}\n"))
                    .unwrap_or_default();
                let passages: Vec<String> =
                    doc.passages.iter().map(|p| format!("* {p}")).collect();

                format!(
                    "# **[{title}]({url}){cached_url}**\n{extended}{passages}",
                    url = doc.url,
                    passages = passages.join("\n")
                )
            })
            .collect();

        fragments.push(docs.join("\n\n"));
    }

    fragments
}
