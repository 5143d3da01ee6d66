//! 国家查找表：显示名、语言、搜索引擎的国家 / 语言 / 界面语言代码
//!
//! 未收录的国家代码回退为代码本身，语言 en / en-US。

/// 单个国家的本地化信息
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CountryInfo {
    pub code: &'static str,
    pub name: &'static str,
    /// ISO 639-1 语言代码
    pub language: &'static str,
    /// 搜索引擎国家代码（UK → GB）
    pub search_country: &'static str,
    /// 搜索结果语言
    pub search_lang: &'static str,
    /// 搜索界面语言
    pub ui_lang: &'static str,
}

const COUNTRIES: &[CountryInfo] = &[
    CountryInfo { code: "ES", name: "Spain", language: "es", search_country: "ES", search_lang: "es", ui_lang: "es-ES" },
    CountryInfo { code: "PT", name: "Portugal", language: "pt", search_country: "PT", search_lang: "pt-pt", ui_lang: "pt-BR" },
    CountryInfo { code: "FR", name: "France", language: "fr", search_country: "FR", search_lang: "fr", ui_lang: "fr-FR" },
    CountryInfo { code: "DE", name: "Germany", language: "de", search_country: "DE", search_lang: "de", ui_lang: "de-DE" },
    CountryInfo { code: "IT", name: "Italy", language: "it", search_country: "IT", search_lang: "it", ui_lang: "it-IT" },
    CountryInfo { code: "UK", name: "United Kingdom", language: "en", search_country: "GB", search_lang: "en", ui_lang: "en-GB" },
    CountryInfo { code: "NL", name: "Netherlands", language: "nl", search_country: "NL", search_lang: "nl", ui_lang: "nl-NL" },
    CountryInfo { code: "BE", name: "Belgium", language: "nl", search_country: "BE", search_lang: "nl", ui_lang: "nl-BE" },
    CountryInfo { code: "PL", name: "Poland", language: "pl", search_country: "PL", search_lang: "pl", ui_lang: "pl-PL" },
    CountryInfo { code: "US", name: "United States", language: "en", search_country: "US", search_lang: "en", ui_lang: "en-US" },
];

/// 已收录的国家（大小写不敏感）
pub fn lookup_country(code: &str) -> Option<&'static CountryInfo> {
    COUNTRIES.iter().find(|c| c.code.eq_ignore_ascii_case(code))
}

/// 国家显示名；未收录时返回代码本身
pub fn country_name(code: &str) -> String {
    lookup_country(code)
        .map(|c| c.name.to_string())
        .unwrap_or_else(|| code.to_string())
}

/// 语言代码 → 英文名
pub fn language_name(language: &str) -> &'static str {
    match language.to_lowercase().as_str() {
        "es" => "Spanish",
        "pt" => "Portuguese",
        "fr" => "French",
        "de" => "German",
        "it" => "Italian",
        "en" => "English",
        "nl" => "Dutch",
        "pl" => "Polish",
        _ => "the local language",
    }
}

/// 搜索参数 (country, search_lang, ui_lang)
pub fn search_params(code: &str) -> (String, String, String) {
    match lookup_country(code) {
        Some(c) => (
            c.search_country.to_string(),
            c.search_lang.to_string(),
            c.ui_lang.to_string(),
        ),
        None => (code.to_uppercase(), "en".to_string(), "en-US".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uk_maps_to_gb() {
        let (country, lang, ui) = search_params("uk");
        assert_eq!(country, "GB");
        assert_eq!(lang, "en");
        assert_eq!(ui, "en-GB");
    }

    #[test]
    fn test_portuguese_search_lang() {
        assert_eq!(search_params("PT").1, "pt-pt");
        assert_eq!(search_params("BE").2, "nl-BE");
    }

    #[test]
    fn test_unknown_country_falls_back() {
        assert_eq!(country_name("MX"), "MX");
        assert_eq!(search_params("mx"), ("MX".into(), "en".into(), "en-US".into()));
        assert_eq!(language_name("xx"), "the local language");
    }
}
