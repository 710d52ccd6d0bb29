//! Best-effort extraction of structured filters from a free-text request.
//!
//! Parsing never fails. Whatever is recognised becomes a [`FloorplanFilter`];
//! the remaining text, minus request fillers and generic nouns, is returned as
//! the residual for semantic search. "Nothing recognised" is the common case.

use std::ops::Range;

use index::{Bounds, FloorplanFilter};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

/// Square metres per pyeong.
pub const PYEONG_TO_M2: f64 = 3.3058;

/// Relative tolerance for `대` / `정도` on areas.
const AREA_AROUND_TOLERANCE: f64 = 0.10;
/// Relative tolerance for a bare area such as `84㎡`.
const AREA_NOMINAL_TOLERANCE: f64 = 0.05;

macro_rules! pattern {
    ($name:ident, $re:expr) => {
        static $name: Lazy<Option<Regex>> = Lazy::new(|| Regex::new($re).ok());
    };
}

const QUALIFIER: &str = r"\s*(이상|이하|정도|대)?";

pattern!(RE_ROOMS_KV, r"(?i)\brooms?\s*[=:]\s*(\d{1,2})");
pattern!(RE_BATHS_KV, r"(?i)\b(?:bathrooms?|baths?)\s*[=:]\s*(\d{1,2})");
pattern!(RE_BAYS_KV, r"(?i)\bbays?\s*[=:]\s*(\d{1,2})");
pattern!(RE_AREA_KV, r"(?i)\barea\s*[=:]\s*(\d+(?:\.\d+)?)");
pattern!(
    RE_STRUCTURE_KV,
    r"(?i)\bstructure\s*[=:]\s*(판상형|타워형|혼합형|복도식|계단식)"
);
pattern!(
    RE_BATHS,
    &format!(r"(?:화장실|욕실)\s*(?:이|은|는)?\s*(\d{{1,2}})\s*(?:개|칸)?{QUALIFIER}")
);
pattern!(
    RE_ROOMS,
    &format!(r"(?:^|[^가-힣])방\s*(?:이|은|는)?\s*(\d{{1,2}})\s*(?:개|칸)?{QUALIFIER}")
);
pattern!(RE_ROOM_WORDS, r"(원룸|투룸|쓰리룸|포룸)");
pattern!(RE_ROOMS_SUFFIX, r"(\d)\s*룸");
pattern!(RE_BAYS, &format!(r"(\d{{1,2}})\s*(?:베이|(?i:bay)){QUALIFIER}"));
pattern!(
    RE_AREA_M2,
    &format!(r"(\d+(?:\.\d+)?)\s*(?:㎡|m²|(?i:m2)|제곱미터){QUALIFIER}")
);
pattern!(RE_PYEONG, &format!(r"(\d+(?:\.\d+)?)\s*평(면)?{QUALIFIER}"));
pattern!(RE_STRUCTURE, r"(판상형|타워형|혼합형|복도식|계단식)");

/// Request fillers and generic nouns that carry no search meaning.
const NOISE: &[&str] = &[
    "찾아줘", "찾아주세요", "찾아", "보여줘", "보여주세요", "추천해줘", "추천해주세요", "추천",
    "알려줘", "알려주세요", "검색해줘", "검색", "있는", "인", "된", "짜리", "좀", "주세요", "줘",
    "원해", "원합니다", "싶어", "아파트", "평면도", "평면", "도면", "집", "매물", "구조", "타입",
    "및", "그리고", "와", "과", "이고", "이며", "please", "find", "show", "me", "with", "and",
    "apartment", "apartments", "plan", "plans", "floorplan", "floorplans",
];

/// Particles that may trail a noise word, as in `아파트를`.
const PARTICLES: &[&str] = &["으로", "로", "을", "를", "이", "가", "은", "는", "인", "의", "도"];

const PUNCTUATION: &[char] = &[',', '.', '?', '!', '~', '·', '/', '(', ')', '"', '\''];

/// Result of [`parse_query`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedQuery {
    /// Structured constraints, `None` when nothing was recognised.
    pub hints: Option<FloorplanFilter>,
    /// Text left for semantic search; empty means a pure-filter query.
    pub residual: String,
    /// The spans that produced `hints`, in the order they were recognised.
    pub matched: Vec<String>,
}

impl ParsedQuery {
    pub fn has_semantic_content(&self) -> bool {
        !self.residual.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Qualifier {
    Exact,
    AtLeast,
    AtMost,
    Around,
}

impl Qualifier {
    fn from_capture(caps: &Captures<'_>, group: usize) -> Self {
        match caps.get(group).map(|m| m.as_str()) {
            Some("이상") => Qualifier::AtLeast,
            Some("이하") => Qualifier::AtMost,
            Some("정도") | Some("대") => Qualifier::Around,
            _ => Qualifier::Exact,
        }
    }

    fn count_bounds(self, n: u32) -> Bounds<u32> {
        match self {
            Qualifier::AtLeast => Bounds::at_least(n),
            Qualifier::AtMost => Bounds::at_most(n),
            Qualifier::Exact | Qualifier::Around => Bounds::exact(n),
        }
    }

    fn area_bounds(self, m2: f64) -> Bounds<f64> {
        match self {
            Qualifier::AtLeast => Bounds::at_least(m2),
            Qualifier::AtMost => Bounds::at_most(m2),
            Qualifier::Around => Bounds::around(m2, AREA_AROUND_TOLERANCE),
            Qualifier::Exact => Bounds::around(m2, AREA_NOMINAL_TOLERANCE),
        }
    }
}

struct Scanner<'q> {
    text: &'q str,
    taken: Vec<Range<usize>>,
    filter: FloorplanFilter,
    matched: Vec<String>,
}

impl<'q> Scanner<'q> {
    fn new(text: &'q str) -> Self {
        Self {
            text,
            taken: Vec::new(),
            filter: FloorplanFilter::default(),
            matched: Vec::new(),
        }
    }

    /// Apply `re` to the parts of the text not consumed yet.
    ///
    /// `apply` returns whether the match was meaningful; only meaningful
    /// matches consume their span. The first value recognised for a field wins.
    fn scan<F>(&mut self, re: &Lazy<Option<Regex>>, apply: F)
    where
        F: Fn(&mut FloorplanFilter, &Captures<'_>) -> bool,
    {
        let Some(re) = re.as_ref() else {
            return;
        };
        for caps in re.captures_iter(self.text) {
            let Some(whole) = caps.get(0) else {
                continue;
            };
            let span = whole.range();
            if self
                .taken
                .iter()
                .any(|t| t.start < span.end && span.start < t.end)
            {
                continue;
            }
            if apply(&mut self.filter, &caps) {
                self.matched.push(whole.as_str().trim().to_string());
                self.taken.push(span);
            }
        }
    }

    fn finish(self) -> ParsedQuery {
        let mut remaining = String::with_capacity(self.text.len());
        for (i, c) in self.text.char_indices() {
            if self.taken.iter().any(|t| t.contains(&i)) {
                remaining.push(' ');
            } else {
                remaining.push(c);
            }
        }

        let residual = remaining
            .split_whitespace()
            .map(|token| token.trim_matches(PUNCTUATION))
            .filter(|token| !token.is_empty() && !is_noise(token))
            .collect::<Vec<_>>()
            .join(" ");

        ParsedQuery {
            hints: (!self.filter.is_empty()).then_some(self.filter),
            residual,
            matched: self.matched,
        }
    }
}

fn is_noise(token: &str) -> bool {
    let lower = token.to_lowercase();
    if NOISE.contains(&lower.as_str()) || PARTICLES.contains(&lower.as_str()) {
        return true;
    }
    PARTICLES.iter().any(|p| {
        lower
            .strip_suffix(p)
            .is_some_and(|stem| !stem.is_empty() && NOISE.contains(&stem))
    })
}

fn capture_u32(caps: &Captures<'_>, group: usize) -> Option<u32> {
    caps.get(group)?.as_str().parse().ok()
}

fn capture_f64(caps: &Captures<'_>, group: usize) -> Option<f64> {
    caps.get(group)?
        .as_str()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && *v > 0.0)
}

fn set_count(slot: &mut Option<Bounds<u32>>, bounds: Bounds<u32>) {
    if slot.is_none() {
        *slot = Some(bounds);
    }
}

fn set_area(filter: &mut FloorplanFilter, bounds: Bounds<f64>) {
    if filter.area_m2.is_none() {
        filter.area_m2 = Some(bounds);
    }
}

fn set_structure(filter: &mut FloorplanFilter, caps: &Captures<'_>) -> bool {
    match caps.get(1) {
        Some(m) => {
            if filter.structure_type.is_none() {
                filter.structure_type = Some(m.as_str().to_string());
            }
            true
        }
        None => false,
    }
}

/// Split a floor-plan request into filter hints and residual text.
///
/// ```
/// use matcher::parse_query;
///
/// let parsed = parse_query("방 3개, 화장실 2개인 아파트 찾아줘");
/// let hints = parsed.hints.unwrap();
/// assert_eq!(hints.room_count.unwrap().min, Some(3));
/// assert!(parsed.residual.is_empty());
/// ```
pub fn parse_query(query: &str) -> ParsedQuery {
    let mut scanner = Scanner::new(query);

    // key=value forms first so `rooms=3` is not read as Korean text.
    scanner.scan(&RE_ROOMS_KV, |f, caps| {
        capture_u32(caps, 1).map(|n| set_count(&mut f.room_count, Bounds::exact(n))).is_some()
    });
    scanner.scan(&RE_BATHS_KV, |f, caps| {
        capture_u32(caps, 1).map(|n| set_count(&mut f.bathroom_count, Bounds::exact(n))).is_some()
    });
    scanner.scan(&RE_BAYS_KV, |f, caps| {
        capture_u32(caps, 1).map(|n| set_count(&mut f.bay_count, Bounds::exact(n))).is_some()
    });
    scanner.scan(&RE_AREA_KV, |f, caps| {
        capture_f64(caps, 1)
            .map(|m2| set_area(f, Qualifier::Exact.area_bounds(m2)))
            .is_some()
    });
    scanner.scan(&RE_STRUCTURE_KV, set_structure);

    // Bathrooms before rooms: `욕실` never overlaps `방`, but `화장실 2개`
    // should be consumed before anything else looks at its digits.
    scanner.scan(&RE_BATHS, |f, caps| {
        capture_u32(caps, 1)
            .map(|n| set_count(&mut f.bathroom_count, Qualifier::from_capture(caps, 2).count_bounds(n)))
            .is_some()
    });
    scanner.scan(&RE_ROOMS, |f, caps| {
        capture_u32(caps, 1)
            .map(|n| set_count(&mut f.room_count, Qualifier::from_capture(caps, 2).count_bounds(n)))
            .is_some()
    });
    scanner.scan(&RE_ROOM_WORDS, |f, caps| {
        let n = match caps.get(1).map(|m| m.as_str()) {
            Some("원룸") => 1,
            Some("투룸") => 2,
            Some("쓰리룸") => 3,
            Some("포룸") => 4,
            _ => return false,
        };
        set_count(&mut f.room_count, Bounds::exact(n));
        true
    });
    scanner.scan(&RE_ROOMS_SUFFIX, |f, caps| {
        capture_u32(caps, 1).map(|n| set_count(&mut f.room_count, Bounds::exact(n))).is_some()
    });
    scanner.scan(&RE_BAYS, |f, caps| {
        capture_u32(caps, 1)
            .map(|n| set_count(&mut f.bay_count, Qualifier::from_capture(caps, 2).count_bounds(n)))
            .is_some()
    });
    scanner.scan(&RE_AREA_M2, |f, caps| {
        capture_f64(caps, 1)
            .map(|m2| set_area(f, Qualifier::from_capture(caps, 2).area_bounds(m2)))
            .is_some()
    });
    scanner.scan(&RE_PYEONG, |f, caps| {
        // `30평면` is not an area.
        if caps.get(2).is_some() {
            return false;
        }
        capture_f64(caps, 1)
            .map(|py| set_area(f, Qualifier::from_capture(caps, 3).area_bounds(py * PYEONG_TO_M2)))
            .is_some()
    });
    scanner.scan(&RE_STRUCTURE, set_structure);

    scanner.finish()
}
