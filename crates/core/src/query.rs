use crate::error::IngestError;
use crate::models::FilterValue;
use regex::Regex;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterKey {
    Type,
    By,
    Tag,
    In,
    From,
    To,
    Collection,
    Top,
}

impl FilterKey {
    fn parse(token: &str) -> Option<Self> {
        match token {
            "type" => Some(Self::Type),
            "by" => Some(Self::By),
            "tag" => Some(Self::Tag),
            "in" => Some(Self::In),
            "from" => Some(Self::From),
            "to" => Some(Self::To),
            "collection" => Some(Self::Collection),
            "top" => Some(Self::Top),
            _ => None,
        }
    }
}

pub fn parse_shorthand(
    query: &str,
) -> Result<(String, HashMap<FilterKey, FilterValue>), IngestError> {
    let directive = Regex::new(
        r#"\b(type|by|tag|in|from|to|collection|top):(=?)("[^"]+"|'[^']+'|\S+)"#,
    )?;

    let mut filters = HashMap::new();
    let stripped = directive.replace_all(query, |caps: &regex::Captures| {
        if let Some(key) = FilterKey::parse(&caps[1]) {
            let value = caps[3].trim_matches('"').trim_matches('\'');
            let value = if caps[2].is_empty() {
                FilterValue::fuzzy(value)
            } else {
                FilterValue::exact(value)
            };
            filters.insert(key, value);
        }
        String::new()
    });

    let collapsed = Regex::new(r"\s{2,}")?.replace_all(&stripped, " ");
    Ok((collapsed.trim().to_string(), filters))
}
