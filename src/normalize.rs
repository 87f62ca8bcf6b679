//! Free-text model output -> structured value.
//!
//! Two stages: a strict JSON parse checked against the expected
//! shape, then a lossy line based extraction. `normalize` never
//! fails and never returns an empty value.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use log::{debug, trace, warn};

/// Stand-in `content` when the model returned only whitespace
pub const EMPTY_CONTENT: &str = "No content generated.";

/// Keys of the fallback object that section buckets may not replace
pub const RESERVED_KEYS: [&str; 2] = ["content", "formatted"];

/// A named bucket of lines in the heuristic fallback
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section
{   pub name: String
  , pub lines: usize
}

impl Section
{   pub fn new(name: impl Into<String>, lines: usize) -> Self
    {   Section
        {   name: name.into()
          , lines
        }
    }
}

/// What the caller expects the reply to look like
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ShapeHint
{   /// Free text, no parse attempted
    #[default]
    Text
  , /// Any JSON object
    Object
  , /// Any JSON array
    Array
  , /// JSON object holding every named section
    Sections { sections: Vec<Section> }
}

impl ShapeHint
{   /// Analysis replies: insights, recommendations, next steps.
    ///
    /// The three-lines-per-bucket split is a placeholder heuristic.
    pub fn analysis() -> Self
    {   ShapeHint::Sections
        {   sections: vec![
              Section::new("insights", 3)
            , Section::new("recommendations", 3)
            , Section::new("next_steps", 3)
            ]
        }
    }

    fn accepts(&self, value: &Value) -> bool
    {   match self
        {   ShapeHint::Text => false
          , ShapeHint::Object => value.is_object()
          , ShapeHint::Array => value.is_array()
          , ShapeHint::Sections { sections } => {
              value.as_object().map_or(false, |obj| {
                sections.iter().all(|s| obj.contains_key(&s.name))
              })
            }
        }
    }
}

/// Result of normalization: parsed, or a synthetic fallback
#[derive(Debug, Clone, PartialEq)]
pub enum Normalized
{   Structured(Value)
  , Fallback(Value)
}

impl Normalized
{   /// Parsed value, `None` when the fallback was used
    pub fn structured(&self) -> Option<&Value>
    {   match self
        {   Normalized::Structured(value) => Some(value)
          , Normalized::Fallback(_) => None
        }
    }

    pub fn value(&self) -> &Value
    {   match self
        {   Normalized::Structured(value) => value
          , Normalized::Fallback(value) => value
        }
    }

    pub fn into_value(self) -> Value
    {   match self
        {   Normalized::Structured(value) => value
          , Normalized::Fallback(value) => value
        }
    }

    pub fn is_structured(&self) -> bool
    {   matches!(self, Normalized::Structured(_))
    }
}

/// Normalize a raw reply against the expected shape
pub fn normalize(raw_text: &str, expected: &ShapeHint) -> Normalized
{   match try_structured_parse(raw_text, expected)
    {   Some(value) => {
          debug!("Reply parsed as structured {:?}", kind_of(expected));
          Normalized::Structured(value)
        }
      , None => {
          debug!(
            "Reply did not parse as {:?}, using heuristic fallback",
            kind_of(expected)
          );
          Normalized::Fallback(heuristic_extract(raw_text, expected))
        }
    }
}

/// Strict stage: JSON matching the shape, or nothing
pub fn try_structured_parse(
  raw_text: &str
, expected: &ShapeHint
) -> Option<Value>
{   if matches!(expected, ShapeHint::Text)
    {   return None;
    }

    let trimmed = raw_text.trim();
    let unfenced = strip_code_fence(trimmed);
    let mut candidates = vec![trimmed, unfenced];
    if let Some(slice) = outer_slice(unfenced, '{', '}')
    {   candidates.push(slice);
    }
    if let Some(slice) = outer_slice(unfenced, '[', ']')
    {   candidates.push(slice);
    }

    candidates
      .into_iter()
      .filter(|c| !c.is_empty())
      .filter_map(|c| {
        let parsed = serde_json::from_str::<Value>(c);
        trace!("Parse candidate ok: {}", parsed.is_ok());
        parsed.ok()
      })
      .find(|value| expected.accepts(value))
}

/// Lossy stage: always returns an object with non-empty `content`
pub fn heuristic_extract(raw_text: &str, expected: &ShapeHint) -> Value
{   let mut value = fallback_object(raw_text);

    if let ShapeHint::Sections { sections } = expected
    {   if let Some(obj) = value.as_object_mut()
        {   let mut lines = content_lines(raw_text);
            for section in sections
            {   if RESERVED_KEYS.contains(&section.name.as_str())
                {   warn!("Skipping section {:?}: reserved key", section.name);
                    continue;
                }
                let bucket: Vec<Value> = lines
                  .by_ref()
                  .take(section.lines)
                  .map(Value::from)
                  .collect();
                obj.insert(section.name.clone(), Value::Array(bucket));
            }
        }
    }

    value
}

/// `{content, formatted: false}` for a raw reply
pub fn fallback_object(raw_text: &str) -> Value
{   let content = if raw_text.trim().is_empty()
    {   EMPTY_CONTENT
    } else
    {   raw_text
    };
    let mut obj = Map::new();
    obj.insert("content".to_string(), json!(content));
    obj.insert("formatted".to_string(), json!(false));
    Value::Object(obj)
}

fn kind_of(shape: &ShapeHint) -> &'static str
{   match shape
    {   ShapeHint::Text => "text"
      , ShapeHint::Object => "object"
      , ShapeHint::Array => "array"
      , ShapeHint::Sections { .. } => "sections"
    }
}

fn strip_code_fence(text: &str) -> &str
{   let Some(rest) = text.strip_prefix("```")
    else
    {   return text;
    };
    // drop the language tag line
    let rest = match rest.find('\n')
    {   Some(idx) => &rest[idx + 1..]
      , None => rest
    };
    rest.trim_end()
      .strip_suffix("```")
      .unwrap_or(rest)
      .trim()
}

fn outer_slice(text: &str, open: char, close: char) -> Option<&str>
{   let start = text.find(open)?;
    let end = text.rfind(close)?;
    (end > start).then(|| &text[start..=end])
}

fn content_lines(raw_text: &str) -> impl Iterator<Item = String> + '_
{   raw_text
      .lines()
      .map(strip_list_marker)
      .filter(|line| !line.is_empty())
      .map(str::to_string)
}

fn strip_list_marker(line: &str) -> &str
{   let line = line.trim();
    for marker in ["- ", "* ", "• "]
    {   if let Some(rest) = line.strip_prefix(marker)
        {   return rest.trim();
        }
    }
    let digits = line.chars().take_while(char::is_ascii_digit).count();
    if digits > 0
    {   let rest = &line[digits..];
        if let Some(rest) = rest
          .strip_prefix(". ")
          .or_else(|| rest.strip_prefix(") "))
        {   return rest.trim();
        }
    }
    line
}
