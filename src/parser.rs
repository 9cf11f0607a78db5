use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use log::{debug, warn};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use crate::fetcher::ResponsePage;
use crate::models::{JobRecord, WorkType};

pub struct Parser {
    card: Selector,
    link: Selector,
    title: Selector,
    title_fallback: Selector,
    company: Selector,
    company_fallback: Selector,
    location: Selector,
    time: Selector,
    listing_status: Selector,
    relative_time_regex: Regex,
}

fn selector(css: &'static str) -> Selector {
    Selector::parse(css).expect("static selector must parse")
}

impl Parser {
    pub fn new() -> Self {
        Parser {
            card: selector("div.base-card"),
            link: selector("a.base-card__full-link"),
            title: selector("span.sr-only"),
            title_fallback: selector("h3.base-search-card__title"),
            company: selector("a.hidden-nested-link"),
            company_fallback: selector("h4.base-search-card__subtitle"),
            location: selector("span.job-search-card__location"),
            time: selector("time"),
            listing_status: selector("span.job-search-card__status"),
            // "16 hours ago", "Reposted 2 weeks ago", "1 mo ago"
            relative_time_regex: Regex::new(
                r"(?i)(\d+)\s*(minutes?|mins?|hours?|hrs?|days?|weeks?|months?|mos?)\s+ago",
            )
            .expect("static regex must compile"),
        }
    }

    /// Splits a page into cards. Each card is turned into a `JobRecord`
    /// only when the returned iterator reaches it.
    pub fn parse(&self, page: &ResponsePage) -> Candidates<'_> {
        let document = Html::parse_document(&page.body);
        let cards: Vec<String> = document.select(&self.card).map(|card| card.html()).collect();
        if cards.is_empty() {
            debug!("No job cards found at offset {}", page.offset);
        }
        Candidates {
            parser: self,
            cards: cards.into_iter(),
            page: page.page,
            reference: page.fetched_at,
        }
    }

    fn parse_card(&self, card_html: &str, page: u32, reference: DateTime<Utc>) -> JobRecord {
        let fragment = Html::parse_fragment(card_html);

        let url = fragment
            .select(&self.link)
            .next()
            .and_then(|link| link.value().attr("href"))
            .map(|href| href.trim().to_string())
            .unwrap_or_default();

        let title = self.first_text(&fragment, &[&self.title, &self.title_fallback]);
        let company = self.first_text(&fragment, &[&self.company, &self.company_fallback]);
        let location = self.first_text(&fragment, &[&self.location]);
        let listing_status = self.first_text(&fragment, &[&self.listing_status]);

        let posting_time = fragment
            .select(&self.time)
            .next()
            .and_then(|time| self.posting_time(time, reference));

        let work_type = match WorkType::detect(&location) {
            WorkType::Unknown => WorkType::detect(&title),
            detected => detected,
        };

        if url.is_empty() {
            warn!("Job card '{}' at page {} has no link", title, page);
        }

        JobRecord {
            url,
            title,
            company,
            location,
            posting_time,
            work_type,
            listing_status,
            source_page: page,
            ..Default::default()
        }
    }

    fn first_text(&self, fragment: &Html, selectors: &[&Selector]) -> String {
        selectors
            .iter()
            .filter_map(|sel| fragment.select(sel).next())
            .map(|el| collapse_whitespace(&el.text().collect::<String>()))
            .find(|text| !text.is_empty())
            .unwrap_or_default()
    }

    fn posting_time(&self, time: ElementRef<'_>, reference: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let text = collapse_whitespace(&time.text().collect::<String>());
        self.convert_relative_time(&text, reference).or_else(|| {
            let datetime = time.value().attr("datetime")?;
            let parsed = parse_iso_date(datetime);
            if parsed.is_none() {
                warn!("Could not parse posting time '{}' / '{}'", text, datetime);
            }
            parsed
        })
    }

    /// Turns "16 hours ago" into an absolute time relative to `reference`.
    pub fn convert_relative_time(&self, text: &str, reference: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let lower = text.trim().to_lowercase();
        if lower == "just now" || lower == "today" {
            return Some(reference);
        }

        let caps = self.relative_time_regex.captures(&lower)?;
        let value: i64 = caps.get(1)?.as_str().parse().ok()?;
        let unit = caps.get(2)?.as_str();

        // Absurd counts ("100000000 days ago") are treated as unparseable.
        let delta = if unit.starts_with("mo") {
            value.checked_mul(30).and_then(Duration::try_days)
        } else if unit.starts_with("mi") {
            Duration::try_minutes(value)
        } else if unit.starts_with('h') {
            Duration::try_hours(value)
        } else if unit.starts_with('d') {
            Duration::try_days(value)
        } else if unit.starts_with('w') {
            Duration::try_weeks(value)
        } else {
            None
        }?;
        reference.checked_sub_signed(delta)
    }
}

impl Default for Parser {
    fn default() -> Self {
        Parser::new()
    }
}

/// Lazy, one-shot sequence of job candidates from a single page, in
/// provider order.
pub struct Candidates<'a> {
    parser: &'a Parser,
    cards: std::vec::IntoIter<String>,
    page: u32,
    reference: DateTime<Utc>,
}

impl Candidates<'_> {
    /// Cards not yet turned into records.
    pub fn remaining(&self) -> usize {
        self.cards.len()
    }
}

impl Iterator for Candidates<'_> {
    type Item = JobRecord;

    fn next(&mut self) -> Option<JobRecord> {
        let card = self.cards.next()?;
        Some(self.parser.parse_card(&card, self.page, self.reference))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.cards.size_hint()
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn parse_iso_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(exact) = DateTime::parse_from_rfc3339(raw) {
        return Some(exact.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()?;
    Some(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 10, 12, 0, 0).unwrap()
    }

    fn page(body: &str) -> ResponsePage {
        ResponsePage {
            offset: 10,
            page: 1,
            body: body.to_string(),
            fetched_at: reference(),
        }
    }

    const CARD: &str = r#"
        <li>
          <div class="base-card relative job-search-card">
            <a class="base-card__full-link" href="https://fr.linkedin.com/jobs/view/rust-engineer-at-acme-3901?refId=abc&amp;trackingId=xyz">
              <span class="sr-only">
                  Rust Engineer
              </span>
            </a>
            <div class="base-search-card__info">
              <h3 class="base-search-card__title">Rust Engineer</h3>
              <h4 class="base-search-card__subtitle">
                <a class="hidden-nested-link" href="https://fr.linkedin.com/company/acme">
                  Acme Corp
                </a>
              </h4>
              <div class="base-search-card__metadata">
                <span class="job-search-card__location">Paris, Île-de-France, France (Hybrid)</span>
                <span class="job-search-card__status">Actively Hiring</span>
                <time class="job-search-card__listdate" datetime="2024-05-09">
                  16 hours ago
                </time>
              </div>
            </div>
          </div>
        </li>"#;

    const CARD_WITHOUT_LINK: &str = r#"
        <li>
          <div class="base-card">
            <div class="base-search-card__info">
              <h3 class="base-search-card__title">Data Engineer (Remote)</h3>
              <h4 class="base-search-card__subtitle">Initech</h4>
              <span class="job-search-card__location">Berlin</span>
              <time datetime="2024-05-01">a while back</time>
            </div>
          </div>
        </li>"#;

    #[test]
    fn extracts_card_fields() {
        let parser = Parser::new();
        let jobs: Vec<JobRecord> = parser.parse(&page(CARD)).collect();
        assert_eq!(jobs.len(), 1);

        let job = &jobs[0];
        assert_eq!(job.title, "Rust Engineer");
        assert_eq!(job.company, "Acme Corp");
        assert_eq!(job.location, "Paris, Île-de-France, France (Hybrid)");
        assert_eq!(job.listing_status, "Actively Hiring");
        assert_eq!(
            job.url,
            "https://fr.linkedin.com/jobs/view/rust-engineer-at-acme-3901?refId=abc&trackingId=xyz"
        );
        assert_eq!(job.posting_time, Some(reference() - Duration::hours(16)));
        assert_eq!(job.work_type, WorkType::Hybrid);
        assert_eq!(job.source_page, 1);
        assert!(job.normalized_url.is_empty());
    }

    #[test]
    fn card_without_link_is_still_emitted() {
        let parser = Parser::new();
        let body = format!("{}{}", CARD, CARD_WITHOUT_LINK);
        let jobs: Vec<JobRecord> = parser.parse(&page(&body)).collect();
        assert_eq!(jobs.len(), 2);

        let orphan = &jobs[1];
        assert!(orphan.url.is_empty());
        assert_eq!(orphan.title, "Data Engineer (Remote)");
        assert_eq!(orphan.company, "Initech");
        assert_eq!(orphan.work_type, WorkType::Remote);
        assert_eq!(
            orphan.posting_time,
            Some(Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap())
        );
    }

    #[test]
    fn candidates_are_lazy_and_ordered() {
        let parser = Parser::new();
        let body = format!("{}{}", CARD_WITHOUT_LINK, CARD);
        let mut candidates = parser.parse(&page(&body));
        assert_eq!(candidates.remaining(), 2);
        assert_eq!(candidates.next().unwrap().company, "Initech");
        assert_eq!(candidates.remaining(), 1);
        assert_eq!(candidates.next().unwrap().company, "Acme Corp");
        assert!(candidates.next().is_none());
    }

    #[test]
    fn page_without_cards_is_empty() {
        let parser = Parser::new();
        let candidates = parser.parse(&page("<html><body><p>nothing here</p></body></html>"));
        assert_eq!(candidates.remaining(), 0);
    }

    #[test]
    fn converts_relative_times() {
        let parser = Parser::new();
        let now = reference();
        assert_eq!(parser.convert_relative_time("10 minutes ago", now), Some(now - Duration::minutes(10)));
        assert_eq!(parser.convert_relative_time("1 hour ago", now), Some(now - Duration::hours(1)));
        assert_eq!(parser.convert_relative_time("Reposted 2 weeks ago", now), Some(now - Duration::weeks(2)));
        assert_eq!(parser.convert_relative_time("3 days ago", now), Some(now - Duration::days(3)));
        assert_eq!(parser.convert_relative_time("1 month ago", now), Some(now - Duration::days(30)));
        assert_eq!(parser.convert_relative_time("Just now", now), Some(now));
        assert_eq!(parser.convert_relative_time("sometime", now), None);
    }

    #[test]
    fn huge_relative_counts_are_unparseable() {
        let parser = Parser::new();
        let now = reference();
        assert_eq!(parser.convert_relative_time("100000000 days ago", now), None);
        assert_eq!(parser.convert_relative_time("9223372036854775807 months ago", now), None);
        assert_eq!(parser.convert_relative_time("9223372036854775807 weeks ago", now), None);
        assert_eq!(parser.convert_relative_time("99999999999999999999 hours ago", now), None);

        let body = CARD.replace("16 hours ago", "100000000 days ago");
        let jobs: Vec<JobRecord> = parser.parse(&page(&body)).collect();
        assert_eq!(jobs.len(), 1);
        assert_eq!(
            jobs[0].posting_time,
            Some(Utc.with_ymd_and_hms(2024, 5, 9, 0, 0, 0).unwrap())
        );
    }
}
