//! Web search links offered when a model has to be found by hand.

const GOOGLE_SEARCH_URL: &str = "https://www.google.com/search";

/// Site a model is commonly published on.
pub const HUGGINGFACE_SITE: &str = "huggingface.co";
/// Site a model is commonly published on.
pub const CIVITAI_SITE: &str = "civitai.com";

/// Google search URL scoped to `site` for the upper-cased digest.
pub fn search_url(site: &str, sha256: &str) -> String {
    format!(
        "{GOOGLE_SEARCH_URL}?q=site:{site}%20{}",
        sha256.trim().to_uppercase()
    )
}

/// HuggingFace- and CivitAI-scoped search URLs, in that order.
pub fn search_urls(sha256: &str) -> (String, String) {
    (
        search_url(HUGGINGFACE_SITE, sha256),
        search_url(CIVITAI_SITE, sha256),
    )
}
