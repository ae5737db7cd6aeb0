// ✅ Consistency Checker - batch checks over the whole catalog
//
// Three independent passes over a CatalogSnapshot:
//   1. barcode check digits
//   2. package amount vs. quantities written in the package text ("2x250g")
//   3. adjacent price rows that look like accidental double entries
//
// Findings are values, never errors. Every pass runs to completion and the
// report order follows the traversal order, so two runs over the same
// snapshot produce identical reports.

use crate::barcode;
use crate::model::{CatalogSnapshot, Package, PriceRecord};
use crate::units::UnitCode;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

// ============================================================================
// FINDINGS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FindingKind {
    InvalidBarcode,
    AmountMismatch,
    /// Package text mixes units that cannot be multiplied into the package unit
    IncompatibleUnits,
    SuspectedDuplicate,
}

impl FindingKind {
    pub fn name(&self) -> &'static str {
        match self {
            FindingKind::InvalidBarcode => "invalid-barcode",
            FindingKind::AmountMismatch => "amount-mismatch",
            FindingKind::IncompatibleUnits => "incompatible-units",
            FindingKind::SuspectedDuplicate => "suspected-duplicate",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsistencyFinding {
    pub kind: FindingKind,

    /// Package ids for package checks, price ids for duplicates
    pub subjects: Vec<i64>,

    pub detail: String,
}

impl fmt::Display for ConsistencyFinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let subjects: Vec<String> = self.subjects.iter().map(|id| format!("#{}", id)).collect();
        write!(f, "[{}] {}: {}", self.kind.name(), subjects.join(", "), self.detail)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConsistencyReport {
    pub findings: Vec<ConsistencyFinding>,
    pub packages_checked: usize,
    pub prices_checked: usize,
}

impl ConsistencyReport {
    pub fn is_clean(&self) -> bool {
        self.findings.is_empty()
    }

    pub fn count(&self, kind: FindingKind) -> usize {
        self.findings.iter().filter(|f| f.kind == kind).count()
    }

    pub fn summary(&self) -> String {
        format!(
            "{} packages, {} prices checked | {} invalid barcodes, {} amount mismatches, {} incompatible units, {} suspected duplicates",
            self.packages_checked,
            self.prices_checked,
            self.count(FindingKind::InvalidBarcode),
            self.count(FindingKind::AmountMismatch),
            self.count(FindingKind::IncompatibleUnits),
            self.count(FindingKind::SuspectedDuplicate),
        )
    }
}

// ============================================================================
// AMOUNT TOKENS
// ============================================================================

/// A `<number><unit>` quantity found in package text
#[derive(Debug, Clone, PartialEq)]
pub struct AmountToken {
    pub value: f64,

    /// Lowercased suffix; empty for a bare count
    pub unit: String,
}

impl fmt::Display for AmountToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.value, self.unit)
    }
}

/// Characters that separate multiplied quantities, as in "2x250g"
const MULTIPLY_SIGNS: [char; 4] = ['x', 'X', '*', '×'];

/// Unit suffixes, attached ("250g") or after spaces ("3 u", "2 m x 3 m")
const UNIT_SUFFIXES: [&str; 9] = ["kg", "g", "l", "ml", "u", "m", "m2", "cm", "cm2"];

fn is_boundary(c: char) -> bool {
    MULTIPLY_SIGNS.contains(&c) || (!c.is_alphanumeric() && c != '.' && c != ',')
}

fn read_letters(chars: &[char], mut i: usize) -> usize {
    let start = i;
    while i < chars.len() && chars[i].is_alphabetic() && !MULTIPLY_SIGNS.contains(&chars[i]) {
        i += 1;
    }
    // Area marker: m2, cm2
    if i > start && i < chars.len() && chars[i] == '2' {
        i += 1;
    }
    i
}

/// A scanned quantity and where it sits in the text
struct Candidate {
    token: AmountToken,
    start: usize,
    end: usize,
}

/// Only whitespace and a single multiply sign between `from` and `to`
fn joined_by_multiply(chars: &[char], from: usize, to: usize) -> bool {
    let mut signs = chars[from..to].iter().filter(|c| !c.is_whitespace());
    matches!((signs.next(), signs.next()), (Some(c), None) if MULTIPLY_SIGNS.contains(c))
}

/// Scan free text for quantities.
///
/// A token starts at a digit that follows a word boundary and must carry a
/// known unit suffix, written directly after the number or after spaces. A
/// bare number is kept only when multiply signs chain it to a unit token
/// ("2x250g", "250g x 2"); percentages, counts of other things and years
/// are ignored.
pub fn parse_amount_tokens(text: &str) -> Vec<AmountToken> {
    let chars: Vec<char> = text.chars().collect();
    let mut candidates: Vec<Candidate> = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        if !chars[i].is_ascii_digit() || (i > 0 && !is_boundary(chars[i - 1])) {
            i += 1;
            continue;
        }

        let start = i;
        while i < chars.len() && chars[i].is_ascii_digit() {
            i += 1;
        }
        if i + 1 < chars.len() && (chars[i] == '.' || chars[i] == ',') && chars[i + 1].is_ascii_digit() {
            i += 1;
            while i < chars.len() && chars[i].is_ascii_digit() {
                i += 1;
            }
        }

        let number: String = chars[start..i].iter().collect();
        let value = match number.replace(',', ".").parse::<f64>() {
            Ok(v) => v,
            Err(_) => continue,
        };

        let suffix_end = read_letters(&chars, i);
        if suffix_end > i {
            // "8slices", "3rd": letters that are not a unit void the number
            let unit: String = chars[i..suffix_end].iter().collect::<String>().to_lowercase();
            let end = suffix_end;
            i = suffix_end;
            if UNIT_SUFFIXES.contains(&unit.as_str()) {
                candidates.push(Candidate { token: AmountToken { value, unit }, start, end });
            }
            continue;
        }

        let mut k = i;
        while k < chars.len() && chars[k] == ' ' {
            k += 1;
        }
        let word_end = read_letters(&chars, k);
        let word: String = chars[k..word_end].iter().collect::<String>().to_lowercase();
        let ends_cleanly = word_end == chars.len() || is_boundary(chars[word_end]);

        let (unit, end) = if k > i && word_end > k && ends_cleanly && UNIT_SUFFIXES.contains(&word.as_str()) {
            (word, word_end)
        } else {
            (String::new(), i)
        };
        i = end;
        candidates.push(Candidate { token: AmountToken { value, unit }, start, end });
    }

    // Group candidates chained by multiply signs; a group without any unit
    // token is noise
    let mut tokens = Vec::new();
    let mut group: Vec<AmountToken> = Vec::new();
    let mut previous_end: Option<usize> = None;

    for candidate in candidates {
        let chained = previous_end.map_or(false, |end| joined_by_multiply(&chars, end, candidate.start));
        if !chained {
            flush_group(&mut group, &mut tokens);
        }
        previous_end = Some(candidate.end);
        group.push(candidate.token);
    }
    flush_group(&mut group, &mut tokens);

    tokens
}

fn flush_group(group: &mut Vec<AmountToken>, tokens: &mut Vec<AmountToken>) {
    if group.iter().any(|t| !t.unit.is_empty()) {
        tokens.append(group);
    }
    group.clear();
}

/// Multiply tokens into an amount expressed in `unit`.
///
/// `Ok(None)` when there is nothing to cross-check (fewer than two tokens).
/// `Err` carries the first token whose unit cannot be combined.
pub fn implied_amount(tokens: &[AmountToken], unit: UnitCode) -> Result<Option<f64>, AmountToken> {
    if tokens.len() < 2 {
        return Ok(None);
    }

    let unit_name = unit.name();
    let mut product = 1.0;

    for token in tokens {
        let factor = if token.unit.is_empty() || token.unit == unit_name {
            token.value
        } else if format!("{}2", token.unit) == unit_name {
            token.value
        } else if token.unit == "cm" && matches!(unit, UnitCode::Meter | UnitCode::SquareMeter) {
            token.value / 100.0
        } else {
            return Err(token.clone());
        };

        product *= factor;
    }

    Ok(Some(product))
}

// ============================================================================
// CONSISTENCY CHECKER
// ============================================================================

pub struct ConsistencyChecker {
    /// A pair is suspicious when more than this many compared fields are equal
    pub duplicate_field_threshold: usize,

    /// Relative tolerance when comparing implied and recorded amounts
    pub amount_tolerance: f64,
}

impl ConsistencyChecker {
    pub fn new() -> Self {
        ConsistencyChecker {
            duplicate_field_threshold: 3,
            amount_tolerance: 1e-9,
        }
    }

    /// Run every pass over the snapshot
    pub fn run(&self, snapshot: &CatalogSnapshot) -> ConsistencyReport {
        let mut findings = Vec::new();

        findings.extend(self.check_barcodes(&snapshot.packages));
        findings.extend(self.check_amounts(&snapshot.packages));
        findings.extend(self.find_duplicate_prices(snapshot));

        let report = ConsistencyReport {
            findings,
            packages_checked: snapshot.packages.len(),
            prices_checked: snapshot.prices.len(),
        };

        tracing::info!("consistency check: {}", report.summary());
        report
    }

    /// Pass 1: check digit of every non-empty barcode
    pub fn check_barcodes(&self, packages: &[Package]) -> Vec<ConsistencyFinding> {
        packages
            .iter()
            .filter_map(|package| {
                let code = package.barcode.as_deref()?.trim();
                if code.is_empty() || barcode::is_valid(code) {
                    return None;
                }

                Some(ConsistencyFinding {
                    kind: FindingKind::InvalidBarcode,
                    subjects: vec![package.id],
                    detail: format!("{} has invalid barcode {}", package.description(), code),
                })
            })
            .collect()
    }

    /// Pass 2: quantities in the package text vs. recorded amount
    pub fn check_amounts(&self, packages: &[Package]) -> Vec<ConsistencyFinding> {
        let mut findings = Vec::new();

        for package in packages {
            let tokens = parse_amount_tokens(&package.extra);

            match implied_amount(&tokens, package.unit) {
                Ok(None) => {}
                Ok(Some(implied)) => {
                    let tolerance = self.amount_tolerance * package.amount.abs().max(1.0);
                    if (implied - package.amount).abs() > tolerance {
                        findings.push(ConsistencyFinding {
                            kind: FindingKind::AmountMismatch,
                            subjects: vec![package.id],
                            detail: format!(
                                "{}: '{}' implies {} {}, recorded {} {}",
                                package.description(),
                                package.extra,
                                implied,
                                package.unit,
                                package.amount,
                                package.unit
                            ),
                        });
                    }
                }
                Err(token) => {
                    findings.push(ConsistencyFinding {
                        kind: FindingKind::IncompatibleUnits,
                        subjects: vec![package.id],
                        detail: format!(
                            "{}: cannot combine '{}' with package unit {}",
                            package.description(),
                            token,
                            package.unit
                        ),
                    });
                }
            }
        }

        findings
    }

    /// Pass 3: adjacent price rows (by id) agreeing on most fields
    pub fn find_duplicate_prices(&self, snapshot: &CatalogSnapshot) -> Vec<ConsistencyFinding> {
        let packages: HashMap<i64, &Package> =
            snapshot.packages.iter().map(|p| (p.id, p)).collect();
        let stores: HashMap<i64, &str> = snapshot
            .stores
            .iter()
            .map(|s| (s.id, s.name.as_str()))
            .collect();

        let mut prices: Vec<&PriceRecord> = snapshot
            .prices
            .iter()
            .filter(|p| !p.known_duplicate)
            .collect();
        prices.sort_by_key(|p| p.id);

        let mut findings = Vec::new();

        for pair in prices.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            let differences = self.differing_fields(a, b, &packages, &stores);
            let matched = 5 - differences.len();

            if matched > self.duplicate_field_threshold {
                let detail = if differences.is_empty() {
                    format!("prices #{} and #{} are identical", a.id, b.id)
                } else {
                    format!(
                        "prices #{} and #{} differ only in {}",
                        a.id,
                        b.id,
                        differences.join("; ")
                    )
                };

                findings.push(ConsistencyFinding {
                    kind: FindingKind::SuspectedDuplicate,
                    subjects: vec![a.id, b.id],
                    detail,
                });
            }
        }

        findings
    }

    fn differing_fields(
        &self,
        a: &PriceRecord,
        b: &PriceRecord,
        packages: &HashMap<i64, &Package>,
        stores: &HashMap<i64, &str>,
    ) -> Vec<String> {
        let mut differences = Vec::new();

        if a.origin != b.origin {
            differences.push(format!("origin: {} → {}", a.origin, b.origin));
        }
        if a.store_id != b.store_id {
            let name = |id: i64| {
                stores
                    .get(&id)
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| format!("store #{}", id))
            };
            differences.push(format!("store: {} → {}", name(a.store_id), name(b.store_id)));
        }
        if a.price != b.price {
            differences.push(format!(
                "price: {:.2} → {:.2}",
                a.price as f64 / 100.0,
                b.price as f64 / 100.0
            ));
        }
        if a.package_id != b.package_id {
            let describe = |id: i64| {
                packages
                    .get(&id)
                    .map(|p| p.description())
                    .unwrap_or_else(|| format!("package #{}", id))
            };
            differences.push(format!(
                "package: {} → {}",
                describe(a.package_id),
                describe(b.package_id)
            ));
        }
        if a.date != b.date {
            differences.push(format!("date: {} → {}", a.date, b.date));
        }

        differences
    }
}

impl Default for ConsistencyChecker {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Store;
    use crate::units::Origin;
    use chrono::NaiveDate;

    fn create_test_package(id: i64, unit: UnitCode, extra: &str, amount: f64, barcode: Option<&str>) -> Package {
        Package {
            id,
            product_id: id,
            product_name: format!("Product {}", id),
            product_extra: String::new(),
            unit,
            brand_name: String::new(),
            extra: extra.to_string(),
            amount,
            barcode: barcode.map(|b| b.to_string()),
        }
    }

    fn create_test_price(id: i64, store_id: i64, package_id: i64, price: i64, day: u32) -> PriceRecord {
        PriceRecord {
            id,
            store_id,
            package_id,
            price,
            date: NaiveDate::from_ymd_opt(2024, 2, day).unwrap(),
            origin: Origin::Offline,
            known_duplicate: false,
        }
    }

    fn token(value: f64, unit: &str) -> AmountToken {
        AmountToken {
            value,
            unit: unit.to_string(),
        }
    }

    // ------------------------------------------------------------------------
    // tokenizer
    // ------------------------------------------------------------------------

    #[test]
    fn test_tokenize_multiplied_pack() {
        assert_eq!(parse_amount_tokens("2x250g"), vec![token(2.0, ""), token(250.0, "g")]);
        assert_eq!(parse_amount_tokens("250g x 2"), vec![token(250.0, "g"), token(2.0, "")]);
        assert_eq!(parse_amount_tokens("6*1,5L"), vec![token(6.0, ""), token(1.5, "l")]);
    }

    #[test]
    fn test_tokenize_spaced_units() {
        assert_eq!(parse_amount_tokens("3 u"), vec![token(3.0, "u")]);
        assert_eq!(parse_amount_tokens("2 m x 3 m"), vec![token(2.0, "m"), token(3.0, "m")]);
        // Ordinary words after a number are not units
        assert!(parse_amount_tokens("6 eggs").is_empty());
    }

    #[test]
    fn test_tokenize_ignores_numbers_inside_words() {
        assert!(parse_amount_tokens("vitamin B12").is_empty());
        assert!(parse_amount_tokens("family pack").is_empty());
        assert!(parse_amount_tokens("").is_empty());
    }

    #[test]
    fn test_tokenize_skips_numbers_without_units() {
        assert_eq!(parse_amount_tokens("0% fat 2x250g"), vec![token(2.0, ""), token(250.0, "g")]);
        assert_eq!(parse_amount_tokens("2x250g (8 slices)"), vec![token(2.0, ""), token(250.0, "g")]);
        assert_eq!(
            parse_amount_tokens("2x250g, best before 2025"),
            vec![token(2.0, ""), token(250.0, "g")]
        );
        assert_eq!(parse_amount_tokens("2x3x100g"), vec![token(2.0, ""), token(3.0, ""), token(100.0, "g")]);
        assert!(parse_amount_tokens("pack of 12 x 8slices").is_empty());
    }

    #[test]
    fn test_implied_amount_rules() {
        assert_eq!(implied_amount(&[token(2.0, ""), token(250.0, "g")], UnitCode::Gram), Ok(Some(500.0)));
        assert_eq!(implied_amount(&[token(2.0, "m"), token(3.0, "m")], UnitCode::SquareMeter), Ok(Some(6.0)));
        assert_eq!(
            implied_amount(&[token(4.0, ""), token(50.0, "cm")], UnitCode::Meter),
            Ok(Some(2.0))
        );
        assert_eq!(implied_amount(&[token(500.0, "g")], UnitCode::Gram), Ok(None));
        assert_eq!(
            implied_amount(&[token(2.0, ""), token(1.0, "kg")], UnitCode::Gram),
            Err(token(1.0, "kg"))
        );
    }

    // ------------------------------------------------------------------------
    // passes
    // ------------------------------------------------------------------------

    #[test]
    fn test_barcode_pass() {
        let checker = ConsistencyChecker::new();
        let packages = vec![
            create_test_package(1, UnitCode::Unit, "", 1.0, Some("4006381333931")),
            create_test_package(2, UnitCode::Unit, "", 1.0, Some("4006381333932")),
            create_test_package(3, UnitCode::Unit, "", 1.0, None),
            create_test_package(4, UnitCode::Unit, "", 1.0, Some("")),
        ];

        let findings = checker.check_barcodes(&packages);

        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].kind, FindingKind::InvalidBarcode);
        assert_eq!(findings[0].subjects, vec![2]);
    }

    #[test]
    fn test_amount_pass_match_and_mismatch() {
        let checker = ConsistencyChecker::new();
        let packages = vec![
            create_test_package(1, UnitCode::Gram, "2x250g", 500.0, None),
            create_test_package(2, UnitCode::Gram, "2x250g", 400.0, None),
            create_test_package(3, UnitCode::Gram, "250g", 400.0, None),
        ];

        let findings = checker.check_amounts(&packages);

        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].kind, FindingKind::AmountMismatch);
        assert_eq!(findings[0].subjects, vec![2]);
    }

    #[test]
    fn test_amount_pass_ignores_stray_numbers() {
        let checker = ConsistencyChecker::new();
        let packages = vec![
            create_test_package(1, UnitCode::Gram, "0% fat 2x250g", 500.0, None),
            create_test_package(2, UnitCode::Gram, "2x250g (8 slices)", 500.0, None),
            create_test_package(3, UnitCode::Unit, "6 eggs", 6.0, None),
        ];

        let findings = checker.check_amounts(&packages);

        assert!(findings.is_empty(), "unexpected findings: {:?}", findings);
    }

    #[test]
    fn test_amount_pass_reports_incompatible_units_and_continues() {
        let checker = ConsistencyChecker::new();
        let packages = vec![
            create_test_package(1, UnitCode::Gram, "2x1kg", 2000.0, None),
            create_test_package(2, UnitCode::Liter, "6x1l", 5.0, None),
        ];

        let findings = checker.check_amounts(&packages);

        assert_eq!(findings.len(), 2);
        assert_eq!(findings[0].kind, FindingKind::IncompatibleUnits);
        assert_eq!(findings[1].kind, FindingKind::AmountMismatch);
    }

    #[test]
    fn test_duplicate_pass() {
        let checker = ConsistencyChecker::new();
        let snapshot = CatalogSnapshot {
            packages: vec![
                create_test_package(1, UnitCode::Liter, "", 1.0, None),
                create_test_package(2, UnitCode::Liter, "", 2.0, None),
            ],
            stores: vec![
                Store { id: 1, name: "Corner".to_string() },
                Store { id: 2, name: "Mega".to_string() },
            ],
            prices: vec![
                create_test_price(1, 1, 1, 199, 1),
                // same store, package, price, origin; new date → 4 of 5
                create_test_price(2, 1, 1, 199, 2),
                // different store, price and date → only 2 of 5 with #2
                create_test_price(3, 2, 1, 250, 3),
                // package differs from #3 → 4 of 5
                create_test_price(4, 2, 2, 250, 3),
            ],
        };

        let findings = checker.find_duplicate_prices(&snapshot);

        assert_eq!(findings.len(), 2);
        assert_eq!(findings[0].subjects, vec![1, 2]);
        assert!(findings[0].detail.contains("date: 2024-02-01 → 2024-02-02"));
        assert_eq!(findings[1].subjects, vec![3, 4]);
        assert!(findings[1].detail.contains("Product 1 1 l → Product 2 2 l"));
    }

    #[test]
    fn test_three_of_five_is_not_a_duplicate() {
        let checker = ConsistencyChecker::new();
        let snapshot = CatalogSnapshot {
            prices: vec![create_test_price(1, 1, 1, 199, 1), create_test_price(2, 1, 1, 250, 2)],
            ..Default::default()
        };

        assert!(checker.find_duplicate_prices(&snapshot).is_empty());
    }

    #[test]
    fn test_known_duplicates_are_skipped_entirely() {
        let checker = ConsistencyChecker::new();
        let mut middle = create_test_price(2, 1, 1, 199, 1);
        middle.known_duplicate = true;

        let snapshot = CatalogSnapshot {
            prices: vec![
                create_test_price(1, 1, 1, 199, 1),
                middle,
                create_test_price(3, 2, 2, 500, 9),
            ],
            ..Default::default()
        };

        // #2 is removed, so #1 is compared with #3 instead
        assert!(checker.find_duplicate_prices(&snapshot).is_empty());
    }

    #[test]
    fn test_identical_rows_reported() {
        let checker = ConsistencyChecker::new();
        let snapshot = CatalogSnapshot {
            prices: vec![create_test_price(1, 1, 1, 199, 1), create_test_price(2, 1, 1, 199, 1)],
            ..Default::default()
        };

        let findings = checker.find_duplicate_prices(&snapshot);
        assert_eq!(findings.len(), 1);
        assert!(findings[0].detail.contains("identical"));
    }

    #[test]
    fn test_run_is_idempotent() {
        let checker = ConsistencyChecker::new();
        let snapshot = CatalogSnapshot {
            packages: vec![
                create_test_package(1, UnitCode::Gram, "2x250g", 400.0, Some("4006381333932")),
                create_test_package(2, UnitCode::Gram, "3x1kg", 3000.0, None),
            ],
            stores: vec![],
            prices: vec![create_test_price(1, 1, 1, 199, 1), create_test_price(2, 1, 1, 199, 1)],
        };

        let first = checker.run(&snapshot);
        let second = checker.run(&snapshot);

        assert_eq!(first, second);
        assert_eq!(first.count(FindingKind::InvalidBarcode), 1);
        assert_eq!(first.count(FindingKind::AmountMismatch), 1);
        assert_eq!(first.count(FindingKind::IncompatibleUnits), 1);
        assert_eq!(first.count(FindingKind::SuspectedDuplicate), 1);
        assert!(!first.is_clean());
        println!("Report: {}", first.summary());
    }
}
