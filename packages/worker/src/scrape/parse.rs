//! HTML parsing for survey result pages.
//!
//! A result page is one big table. Each posting occupies a main row
//! (university / program / date-added / decision cells plus a link to its
//! `/result/<id>` page), usually followed by a stats row (GPA, GRE scores,
//! term, American/International) and sometimes a single-cell comment row.
//! Rows without a result link are skipped: the result URL is the natural
//! key and nothing can be deduplicated without it.

use lazy_static::lazy_static;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use crate::store::ApplicantRecord;

const SITE_ROOT: &str = "https://www.thegradcafe.com";
const MAX_COMMENT_LEN: usize = 500;

lazy_static! {
    static ref RESULT_HREF_RE: Regex = Regex::new(r"/result/\d+").unwrap();
    static ref DECISION_RE: Regex =
        Regex::new(r"(?i)(Accepted|Rejected|Wait listed|Interview)").unwrap();
    static ref DECISION_DATE_RE: Regex = Regex::new(r"(?i)on\s*(.*)").unwrap();
    static ref REPORT_SUFFIX_RE: Regex = Regex::new(r"Report$").unwrap();
    static ref GPA_RE: Regex = Regex::new(r"(?i)GPA\s*([\d.]+)").unwrap();
    static ref GRE_RE: Regex = Regex::new(r"(?i)GRE\s*(\d+)").unwrap();
    static ref GRE_V_RE: Regex = Regex::new(r"(?i)GRE V\s*(\d+)").unwrap();
    static ref GRE_AW_RE: Regex = Regex::new(r"(?i)GRE AW\s*([\d.]+)").unwrap();
    static ref TERM_RE: Regex =
        Regex::new(r"(?i)(Fall|Spring|Summer|Winter)\s*(\d{4})").unwrap();
    static ref TR_SELECTOR: Selector = Selector::parse("tr").unwrap();
    static ref TD_SELECTOR: Selector = Selector::parse("td").unwrap();
    static ref TABLE_SELECTOR: Selector = Selector::parse("table").unwrap();
    static ref LINK_SELECTOR: Selector = Selector::parse("a[href]").unwrap();
}

/// Parse decision status and date from the decision cell text.
fn parse_decision(text: &str) -> (String, Option<String>) {
    let status = DECISION_RE
        .captures(text)
        .map(|c| c[1].to_string())
        .unwrap_or_else(|| "Unknown".to_string());
    let date = DECISION_DATE_RE
        .captures(text)
        .map(|c| c[1].trim().to_string())
        .filter(|d| !d.is_empty());
    (status, date)
}

/// Classify the degree from the program cell text.
fn determine_degree(program: &str) -> &'static str {
    if program.contains("PhD") {
        "PhD"
    } else if program.contains("Masters") {
        "Masters"
    } else {
        "Other"
    }
}

#[derive(Debug, Default)]
struct Stats {
    gpa: Option<f64>,
    gre: Option<f64>,
    gre_v: Option<f64>,
    gre_aw: Option<f64>,
    us_or_international: Option<String>,
    term: Option<String>,
}

/// Pull GPA, GRE scores, term, and applicant origin out of raw stats text.
fn parse_stats(text: &str) -> Stats {
    let capture_f64 = |re: &Regex| {
        re.captures(text)
            .and_then(|c| c[1].parse::<f64>().ok())
    };

    let us_or_international = if text.contains("International") {
        Some("International".to_string())
    } else if text.contains("American") {
        Some("American".to_string())
    } else {
        None
    };

    let term = TERM_RE
        .captures(text)
        .map(|c| format!("{} {}", &c[1], &c[2]));

    Stats {
        gpa: capture_f64(&GPA_RE),
        gre: capture_f64(&GRE_RE),
        gre_v: capture_f64(&GRE_V_RE),
        gre_aw: capture_f64(&GRE_AW_RE),
        us_or_international,
        term,
    }
}

/// Full result URL from a row's `/result/<id>` link, if present.
fn entry_url(row: &ElementRef) -> Option<String> {
    row.select(&LINK_SELECTOR)
        .filter_map(|a| a.value().attr("href"))
        .find(|href| RESULT_HREF_RE.is_match(href))
        .map(|href| {
            if href.starts_with('/') {
                format!("{}{}", SITE_ROOT, href)
            } else {
                href.to_string()
            }
        })
}

/// Concatenated text of an element with collapsed whitespace.
fn element_text(el: &ElementRef) -> String {
    el.text()
        .flat_map(|t| t.split_whitespace())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Extract all postings from one survey page.
pub fn parse_page(html: &str) -> Vec<ApplicantRecord> {
    let document = Html::parse_document(html);

    let Some(table) = document.select(&TABLE_SELECTOR).next() else {
        return Vec::new();
    };
    let rows: Vec<ElementRef> = table.select(&TR_SELECTOR).collect();

    let mut records = Vec::new();
    for (i, row) in rows.iter().enumerate() {
        let cells: Vec<ElementRef> = row.select(&TD_SELECTOR).collect();
        if cells.len() < 4 {
            continue;
        }
        let Some(url) = entry_url(row) else {
            continue;
        };

        let university = REPORT_SUFFIX_RE
            .replace(element_text(&cells[0]).trim(), "")
            .trim()
            .to_string();
        let program = element_text(&cells[1]);
        let date_added = element_text(&cells[2]);
        let (status, decision_date) = parse_decision(&element_text(&cells[3]));

        // Comment row: a single-cell row two below the main row
        let comments = rows.get(i + 2).and_then(|r| {
            let tds: Vec<ElementRef> = r.select(&TD_SELECTOR).collect();
            if tds.len() == 1 {
                let text: String = element_text(r).chars().take(MAX_COMMENT_LEN).collect();
                (!text.is_empty()).then_some(text)
            } else {
                None
            }
        });

        // Stats can sit in the main row or either of the two rows below it
        let mut stats_text = element_text(row);
        for adjacent in rows.iter().skip(i + 1).take(2) {
            stats_text.push(' ');
            stats_text.push_str(&element_text(adjacent));
        }
        let stats = parse_stats(&stats_text);

        records.push(ApplicantRecord {
            degree: Some(determine_degree(&program).to_string()),
            program: Some(program),
            university: Some(university),
            status: Some(status),
            term: stats.term,
            us_or_international: stats.us_or_international,
            comments,
            decision_date,
            date_added: Some(date_added),
            url,
            gpa: stats.gpa,
            gre: stats.gre,
            gre_v: stats.gre_v,
            gre_aw: stats.gre_aw,
            llm_generated_program: None,
            llm_generated_university: None,
        });
    }

    records
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result_page(entries: &[(u64, &str, &str, &str, &str)]) -> String {
        let mut rows = String::new();
        for (id, university, program, date, decision) in entries {
            rows.push_str(&format!(
                "<tr>\
                   <td>{university}Report</td>\
                   <td><a href=\"/result/{id}\">{program}</a></td>\
                   <td>{date}</td>\
                   <td>{decision}</td>\
                 </tr>\
                 <tr><td>Fall 2025</td><td>International</td>\
                     <td>GPA 3.85</td><td>GRE 168 GRE V 162 GRE AW 4.5</td></tr>\
                 <tr><td>Great program, highly recommend.</td></tr>"
            ));
        }
        format!("<html><body><table><tr><th>School</th></tr>{rows}</table></body></html>")
    }

    #[test]
    fn test_parse_page_extracts_records() {
        let html = result_page(&[
            (
                900002,
                "Stanford University",
                "Computer Science, PhD",
                "March 3, 2025",
                "Accepted on 1 Mar",
            ),
            (
                900001,
                "Johns Hopkins University",
                "Computer Science, Masters",
                "March 2, 2025",
                "Rejected on 28 Feb",
            ),
        ]);

        let records = parse_page(&html);
        assert_eq!(records.len(), 2);

        let first = &records[0];
        assert_eq!(first.url, "https://www.thegradcafe.com/result/900002");
        assert_eq!(first.university.as_deref(), Some("Stanford University"));
        assert_eq!(first.degree.as_deref(), Some("PhD"));
        assert_eq!(first.status.as_deref(), Some("Accepted"));
        assert_eq!(first.decision_date.as_deref(), Some("1 Mar"));
        assert_eq!(first.term.as_deref(), Some("Fall 2025"));
        assert_eq!(first.us_or_international.as_deref(), Some("International"));
        assert_eq!(first.gpa, Some(3.85));
        assert_eq!(first.gre, Some(168.0));
        assert_eq!(first.gre_v, Some(162.0));
        assert_eq!(first.gre_aw, Some(4.5));
        assert_eq!(
            first.comments.as_deref(),
            Some("Great program, highly recommend.")
        );

        assert_eq!(records[1].degree.as_deref(), Some("Masters"));
        assert_eq!(records[1].status.as_deref(), Some("Rejected"));
    }

    #[test]
    fn test_rows_without_result_link_are_skipped() {
        let html = "<html><table>\
            <tr><td>A</td><td>B</td><td>C</td><td>D</td></tr>\
            </table></html>";
        assert!(parse_page(html).is_empty());
    }

    #[test]
    fn test_page_without_table_yields_nothing() {
        assert!(parse_page("<html><body><p>maintenance</p></body></html>").is_empty());
    }

    #[test]
    fn test_decision_fallback_is_unknown() {
        let (status, date) = parse_decision("Other via E-mail");
        assert_eq!(status, "Unknown");
        assert!(date.is_none());
    }

    #[test]
    fn test_missing_gpa_stays_absent() {
        let stats = parse_stats("Fall 2024 American GRE 158");
        assert_eq!(stats.gpa, None);
        assert_eq!(stats.gre, Some(158.0));
        assert_eq!(stats.term.as_deref(), Some("Fall 2024"));
        assert_eq!(stats.us_or_international.as_deref(), Some("American"));
    }

    #[test]
    fn test_degree_classification() {
        assert_eq!(determine_degree("History, PhD"), "PhD");
        assert_eq!(determine_degree("History, Masters"), "Masters");
        assert_eq!(determine_degree("History, MFA"), "Other");
    }
}
