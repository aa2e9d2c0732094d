use domain::models::ChainResponse;
use shared::utils::truncate_chars;

pub const SNIPPET_CHARS: usize = 200;

/// The answer alone, exactly as the model produced it.
pub fn format_response(response: &ChainResponse) -> String {
    format!("Response: {}\n", response.answer)
}

/// The answer plus a short snippet of every note it was grounded on.
pub fn format_with_sources(response: &ChainResponse) -> String {
    let mut lines = vec![
        format!("Query: {}\n", response.query),
        format!("Response: {}\n", response.answer),
        "\nRelevant Context:".to_string(),
    ];
    for (i, doc) in response.sources.iter().enumerate() {
        let snippet = truncate_chars(doc.content().trim(), SNIPPET_CHARS);
        lines.push(format!(
            "{}. File: {}\n   Snippet: {}\n",
            i + 1,
            doc.file_name(),
            snippet
        ));
    }
    lines.join("\n")
}
