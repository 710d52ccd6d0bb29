//! Best-effort extraction of Korean lot addresses and zoning hints.
//!
//! [`parse_address`] never fails: a question without any recognisable
//! address simply yields `address: None` and keeps every word as a keyword
//! candidate.

use std::ops::Range;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

macro_rules! pattern {
    ($name:ident, $re:expr) => {
        static $name: Lazy<Option<Regex>> = Lazy::new(|| Regex::new($re).ok());
    };
}

pattern!(
    RE_PROVINCE,
    r"(서울특별시|서울시|서울|부산광역시|부산|대구광역시|대구|인천광역시|인천|광주광역시|대전광역시|대전|울산광역시|울산|세종특별자치시|세종시|경기도|강원특별자치도|강원도|충청북도|충북|충청남도|충남|전북특별자치도|전라북도|전북|전라남도|전남|경상북도|경북|경상남도|경남|제주특별자치도|제주도)"
);
pattern!(RE_DISTRICT, r"([가-힣]{1,5}(?:시|군|구))(?:에서|에|의|은|는)?\b");
pattern!(
    RE_NEIGHBORHOOD,
    r"([가-힣]{1,6}\d{0,3}(?:동|읍|면|리|로|길))(?:\s*(산?\s?\d{1,5}(?:-\d{1,5})?)(?:번지)?)?(?:에서|에|의|은|는)?\b"
);
pattern!(RE_LOT, r"\b(산?\d{1,5}-\d{1,5})(?:번지)?");
pattern!(
    RE_REGION_CODE,
    r"(?i)(?:(?:법정동코드|지역코드|region_code|code)\s*[=:]?|[=:])\s*(\d{5})\b"
);
pattern!(RE_ZONE, r"([가-힣0-9]{2,14}지역)");

/// Words that carry no retrieval meaning in a regulation question.
const STOP_WORDS: &[&str] = &[
    "지을", "짓고", "짓기", "지어도", "건축", "건축할", "할", "수", "있어", "있나요", "있을까",
    "있는지", "있습니까", "되나요", "돼", "되는지", "가능", "가능한가요", "가능해", "가능할까",
    "알려줘", "알려주세요", "궁금해", "궁금합니다", "뭐야", "무엇", "어떻게", "어떤", "좀",
    "여기", "거기", "이", "그", "저", "땅", "부지", "필지", "주소",
];

const PARTICLES: &[&str] = &[
    "에서", "으로", "에는", "에", "의", "은", "는", "이", "가", "을", "를", "로", "도", "과", "와",
];

const PUNCTUATION: &[char] = &[',', '.', '?', '!', '~', '"', '\'', '(', ')'];

/// Address pieces found in the question, in administrative order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressParts {
    /// 시/도
    pub province: Option<String>,
    /// 시/군/구
    pub district: Option<String>,
    /// 읍/면/동 or road name
    pub neighborhood: Option<String>,
    /// 지번, e.g. `123-45`
    pub lot_number: Option<String>,
}

impl AddressParts {
    /// The parts joined with single spaces, as used for parcel lookup.
    pub fn full(&self) -> String {
        [
            self.province.as_deref(),
            self.district.as_deref(),
            self.neighborhood.as_deref(),
            self.lot_number.as_deref(),
        ]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join(" ")
    }

    /// The most specific region name available (district, else province).
    pub fn region_name(&self) -> Option<&str> {
        self.district.as_deref().or(self.province.as_deref())
    }

    fn is_empty(&self) -> bool {
        self.province.is_none()
            && self.district.is_none()
            && self.neighborhood.is_none()
            && self.lot_number.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedAddress {
    pub address: Option<AddressParts>,
    /// Explicit five-digit region code.
    pub region_code: Option<String>,
    /// Zone name such as `제2종일반주거지역`.
    pub zone_name: Option<String>,
    /// Content words for keyword retrieval.
    pub keywords: Vec<String>,
    /// The question minus the recognised spans, whitespace-collapsed.
    pub residual: String,
}

impl ParsedAddress {
    pub fn has_location(&self) -> bool {
        self.address.is_some() || self.region_code.is_some() || self.zone_name.is_some()
    }
}

#[derive(Default)]
struct Found {
    parts: AddressParts,
    /// End offsets of accepted province and district matches.
    admin_ends: Vec<usize>,
    region_code: Option<String>,
    zone_name: Option<String>,
}

struct Scanner<'q> {
    text: &'q str,
    taken: Vec<Range<usize>>,
    found: Found,
}

impl<'q> Scanner<'q> {
    fn scan<F>(&mut self, re: &Lazy<Option<Regex>>, apply: F)
    where
        F: Fn(&mut Found, &Captures<'_>) -> bool,
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
            if apply(&mut self.found, &caps) {
                self.taken.push(span);
            }
        }
    }

    fn remaining(&self) -> String {
        self.text
            .char_indices()
            .map(|(i, c)| {
                if self.taken.iter().any(|t| t.contains(&i)) {
                    ' '
                } else {
                    c
                }
            })
            .collect()
    }
}

fn first_capture(slot: &mut Option<String>, caps: &Captures<'_>, group: usize) -> bool {
    match caps.get(group) {
        Some(m) => {
            if slot.is_none() {
                *slot = Some(m.as_str().split_whitespace().collect::<String>());
            }
            true
        }
        None => false,
    }
}

fn admin_capture(
    found: &mut Found,
    caps: &Captures<'_>,
    slot: impl Fn(&mut AddressParts) -> &mut Option<String>,
) -> bool {
    if !first_capture(slot(&mut found.parts), caps, 1) {
        return false;
    }
    if let Some(whole) = caps.get(0) {
        found.admin_ends.push(whole.end());
    }
    true
}

fn strip_particle(token: &str) -> &str {
    PARTICLES
        .iter()
        .find_map(|p| {
            token
                .strip_suffix(p)
                .filter(|stem| stem.chars().count() >= 2)
        })
        .unwrap_or(token)
}

/// Pull address, region code and zone name out of a regulation question.
pub fn parse_address(question: &str) -> ParsedAddress {
    let mut scanner = Scanner {
        text: question,
        taken: Vec::new(),
        found: Found::default(),
    };

    scanner.scan(&RE_ZONE, |f, caps| first_capture(&mut f.zone_name, caps, 1));
    scanner.scan(&RE_PROVINCE, |f, caps| {
        admin_capture(f, caps, |parts| &mut parts.province)
    });
    scanner.scan(&RE_DISTRICT, |f, caps| {
        admin_capture(f, caps, |parts| &mut parts.district)
    });
    // A 동/리/로 word is a place only right after a province or district,
    // or with a lot number. 거리 and 숙박시설로 stay keywords.
    scanner.scan(&RE_NEIGHBORHOOD, |f, caps| {
        let Some(whole) = caps.get(0) else {
            return false;
        };
        let after_admin = f
            .admin_ends
            .iter()
            .any(|&end| end <= whole.start() && question[end..whole.start()].trim().is_empty());
        if !after_admin && caps.get(2).is_none() {
            return false;
        }
        let matched = first_capture(&mut f.parts.neighborhood, caps, 1);
        if matched && caps.get(2).is_some() {
            first_capture(&mut f.parts.lot_number, caps, 2);
        }
        matched
    });
    scanner.scan(&RE_LOT, |f, caps| first_capture(&mut f.parts.lot_number, caps, 1));
    scanner.scan(&RE_REGION_CODE, |f, caps| {
        first_capture(&mut f.region_code, caps, 1)
    });

    let remaining = scanner.remaining();
    let tokens: Vec<&str> = remaining
        .split_whitespace()
        .map(|t| t.trim_matches(PUNCTUATION))
        .filter(|t| !t.is_empty())
        .collect();
    let residual = tokens.join(" ");

    let mut keywords: Vec<String> = Vec::new();
    for token in tokens {
        let stem = strip_particle(token);
        if stem.chars().count() < 2 || STOP_WORDS.contains(&stem) || STOP_WORDS.contains(&token) {
            continue;
        }
        if !keywords.iter().any(|k| k == stem) {
            keywords.push(stem.to_string());
        }
    }

    let Found {
        parts,
        region_code,
        zone_name,
        ..
    } = scanner.found;
    ParsedAddress {
        address: (!parts.is_empty()).then_some(parts),
        region_code,
        zone_name,
        keywords,
        residual,
    }
}
