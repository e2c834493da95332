//! NCBI E-utilities style source: `esearch` resolves ids as JSON, `efetch`
//! returns titles and abstracts for those ids as XML.

use std::time::Duration;

use async_trait::async_trait;
use quick_xml::events::Event;
use quick_xml::Reader;
use serde::Deserialize;

use super::{LiteratureError, LiteratureSource};
use crate::config::LiteratureSourceConfig;
use crate::models::ExternalSnippet;

const TOP_CONFIDENCE: f32 = 0.9;
const CONFIDENCE_STEP: f32 = 0.1;
const MIN_CONFIDENCE: f32 = 0.1;

pub struct EntrezSource {
    config: LiteratureSourceConfig,
    client: reqwest::Client,
}

/// One article parsed from an `efetch` response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Article {
    pub id: String,
    pub title: String,
    pub abstract_text: String,
    pub year: Option<String>,
}

#[derive(Deserialize)]
struct SearchResponse {
    esearchresult: SearchResult,
}

#[derive(Deserialize)]
struct SearchResult {
    #[serde(default)]
    idlist: Vec<String>,
}

impl EntrezSource {
    pub fn new(config: LiteratureSourceConfig, timeout_secs: u64) -> Result<Self, LiteratureError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| LiteratureError::Http(e.to_string()))?;
        Ok(Self { config, client })
    }

    /// Phase one: ids matching `query`, best first.
    async fn search_ids(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<String>, LiteratureError> {
        let retmax = max_results.to_string();
        let mut params = vec![
            ("db", self.config.database.as_str()),
            ("term", query),
            ("retmode", "json"),
            ("retmax", retmax.as_str()),
        ];
        if let Some(key) = self.config.api_key.as_deref() {
            params.push(("api_key", key));
        }

        let response = self.get(&self.config.search_url, &params).await?;
        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| LiteratureError::Parse(e.to_string()))?;
        Ok(parsed.esearchresult.idlist)
    }

    /// Phase two: titles and abstracts for `ids` in one request.
    async fn fetch_articles(&self, ids: &[String]) -> Result<Vec<Article>, LiteratureError> {
        let joined = ids.join(",");
        let mut params = vec![
            ("db", self.config.database.as_str()),
            ("id", joined.as_str()),
            ("retmode", "xml"),
        ];
        if let Some(key) = self.config.api_key.as_deref() {
            params.push(("api_key", key));
        }

        let response = self.get(&self.config.fetch_url, &params).await?;
        let body = response
            .text()
            .await
            .map_err(|e| LiteratureError::Http(e.to_string()))?;
        parse_articles(&body)
    }

    async fn get(
        &self,
        url: &str,
        params: &[(&str, &str)],
    ) -> Result<reqwest::Response, LiteratureError> {
        let response = self
            .client
            .get(url)
            .query(params)
            .send()
            .await
            .map_err(|e| LiteratureError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(LiteratureError::Status {
                status: status.as_u16(),
            });
        }
        Ok(response)
    }

    fn article_url(&self, id: &str) -> String {
        if self.config.database == "pubmed" {
            format!("https://pubmed.ncbi.nlm.nih.gov/{id}/")
        } else {
            format!("https://www.ncbi.nlm.nih.gov/{}/{id}", self.config.database)
        }
    }
}

#[async_trait]
impl LiteratureSource for EntrezSource {
    fn name(&self) -> &str {
        &self.config.name
    }

    async fn search(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<ExternalSnippet>, LiteratureError> {
        let ids = self.search_ids(query, max_results).await?;
        if ids.is_empty() {
            return Ok(vec![]);
        }
        let mut articles = self.fetch_articles(&ids).await?;

        // Keep the relevance order of the search phase.
        articles.sort_by_key(|a| ids.iter().position(|id| *id == a.id).unwrap_or(usize::MAX));

        let snippets: Vec<ExternalSnippet> = articles
            .into_iter()
            .filter(|a| !a.title.is_empty() || !a.abstract_text.is_empty())
            .take(max_results)
            .enumerate()
            .map(|(i, a)| ExternalSnippet {
                url: self.article_url(&a.id),
                title: a.title,
                abstract_text: a.abstract_text,
                source_name: self.config.name.clone(),
                confidence: position_confidence(i),
                published_date: a.year,
            })
            .collect();

        tracing::debug!(
            source = %self.config.name,
            ids = ids.len(),
            snippets = snippets.len(),
            "Literature fetched"
        );
        Ok(snippets)
    }
}

/// Linear decay by result position.
pub fn position_confidence(position: usize) -> f32 {
    (TOP_CONFIDENCE - CONFIDENCE_STEP * position as f32).max(MIN_CONFIDENCE)
}

#[derive(Clone, Copy, PartialEq)]
enum Field {
    Id,
    Title,
    Abstract,
    Year,
}

/// Parse a PubMed `efetch` XML document.
pub fn parse_articles(xml: &str) -> Result<Vec<Article>, LiteratureError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut articles = Vec::new();
    let mut buf = Vec::new();
    let mut current: Option<Article> = None;
    let mut field: Option<Field> = None;
    let mut in_pub_date = false;
    let mut abstract_parts: Vec<String> = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                match name.as_str() {
                    "PubmedArticle" => {
                        current = Some(Article::default());
                        abstract_parts.clear();
                    }
                    // Only the article's own id; cited articles carry PMIDs too.
                    "PMID" if current.as_ref().is_some_and(|a| a.id.is_empty()) => {
                        field = Some(Field::Id);
                    }
                    "ArticleTitle" => field = Some(Field::Title),
                    "AbstractText" => {
                        abstract_parts.push(String::new());
                        field = Some(Field::Abstract);
                    }
                    "PubDate" => in_pub_date = true,
                    "Year" | "MedlineDate" if in_pub_date => field = Some(Field::Year),
                    _ => {}
                }
            }
            Ok(Event::End(ref e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                match name.as_str() {
                    "PubmedArticle" => {
                        if let Some(mut article) = current.take() {
                            article.abstract_text = abstract_parts
                                .iter()
                                .filter(|p| !p.is_empty())
                                .cloned()
                                .collect::<Vec<_>>()
                                .join(" ");
                            articles.push(article);
                        }
                        field = None;
                    }
                    "PMID" | "ArticleTitle" | "AbstractText" | "Year" | "MedlineDate" => {
                        field = None
                    }
                    "PubDate" => in_pub_date = false,
                    _ => {}
                }
            }
            Ok(Event::Text(e)) => {
                let text = e.unescape().unwrap_or_default().to_string();
                if let (Some(article), Some(f)) = (current.as_mut(), field) {
                    let target = match f {
                        Field::Id => Some(&mut article.id),
                        Field::Title => Some(&mut article.title),
                        Field::Abstract => abstract_parts.last_mut(),
                        Field::Year => Some(article.year.get_or_insert_with(String::new)),
                    };
                    if let Some(target) = target {
                        if !target.is_empty() {
                            target.push(' ');
                        }
                        target.push_str(&text);
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(LiteratureError::Parse(format!(
                    "XML error at position {}: {e}",
                    reader.buffer_position()
                )));
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(articles)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::Query;
    use axum::http::StatusCode;
    use axum::routing::get;
    use axum::{Json, Router};
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    const EFETCH: &str = r#"<?xml version="1.0"?>
<PubmedArticleSet>
  <PubmedArticle>
    <MedlineCitation>
      <PMID Version="1">222</PMID>
      <Article>
        <Journal><JournalIssue><PubDate><Year>2019</Year><Month>Mar</Month></PubDate></JournalIssue></Journal>
        <ArticleTitle>Beta blockers after <i>myocardial</i> infarction</ArticleTitle>
        <Abstract>
          <AbstractText Label="BACKGROUND">Beta blockers are standard.</AbstractText>
          <AbstractText Label="RESULTS">Dose titration reduced mortality &amp; readmission.</AbstractText>
        </Abstract>
      </Article>
      <CommentsCorrectionsList><CommentsCorrections><PMID>999</PMID></CommentsCorrections></CommentsCorrectionsList>
    </MedlineCitation>
  </PubmedArticle>
  <PubmedArticle>
    <MedlineCitation>
      <PMID>111</PMID>
      <Article>
        <Journal><JournalIssue><PubDate><MedlineDate>2018 Jan-Feb</MedlineDate></PubDate></JournalIssue></Journal>
        <ArticleTitle>Aspirin in secondary prevention.</ArticleTitle>
      </Article>
    </MedlineCitation>
  </PubmedArticle>
</PubmedArticleSet>"#;

    #[test]
    fn parses_titles_abstracts_and_dates() {
        let articles = parse_articles(EFETCH).unwrap();
        assert_eq!(articles.len(), 2);

        assert_eq!(articles[0].id, "222");
        assert_eq!(articles[0].title, "Beta blockers after myocardial infarction");
        assert_eq!(
            articles[0].abstract_text,
            "Beta blockers are standard. Dose titration reduced mortality & readmission."
        );
        assert_eq!(articles[0].year.as_deref(), Some("2019"));

        assert_eq!(articles[1].id, "111");
        assert!(articles[1].abstract_text.is_empty());
        assert_eq!(articles[1].year.as_deref(), Some("2018 Jan-Feb"));
    }

    #[test]
    fn malformed_xml_is_a_parse_error() {
        let err = parse_articles("<PubmedArticle><PMID>1</Wrong></PubmedArticle>").unwrap_err();
        assert!(matches!(err, LiteratureError::Parse(_)));
    }

    #[test]
    fn confidence_decays_with_position() {
        assert!((position_confidence(0) - 0.9).abs() < 1e-6);
        assert!((position_confidence(1) - 0.8).abs() < 1e-6);
        assert!((position_confidence(20) - 0.1).abs() < 1e-6);
    }

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn source_for(base: &str, api_key: Option<&str>) -> EntrezSource {
        let mut config = LiteratureSourceConfig::pubmed(api_key.map(str::to_string));
        config.search_url = format!("{base}/esearch.fcgi");
        config.fetch_url = format!("{base}/efetch.fcgi");
        EntrezSource::new(config, 5).unwrap()
    }

    #[tokio::test]
    async fn two_phase_search_returns_ranked_snippets() {
        let seen = Arc::new(Mutex::new(Vec::<HashMap<String, String>>::new()));
        let search_seen = seen.clone();
        let fetch_seen = seen.clone();
        let app = Router::new()
            .route(
                "/esearch.fcgi",
                get(move |Query(q): Query<HashMap<String, String>>| {
                    let seen = search_seen.clone();
                    async move {
                        seen.lock().unwrap().push(q);
                        Json(json!({ "esearchresult": { "count": "2", "idlist": ["111", "222"] } }))
                    }
                }),
            )
            .route(
                "/efetch.fcgi",
                get(move |Query(q): Query<HashMap<String, String>>| {
                    let seen = fetch_seen.clone();
                    async move {
                        seen.lock().unwrap().push(q);
                        EFETCH
                    }
                }),
            );
        let base = serve(app).await;
        let source = source_for(&base, Some("k123"));

        let snippets = source.search("beta blocker", 5).await.unwrap();

        assert_eq!(snippets.len(), 2);
        assert_eq!(snippets[0].url, "https://pubmed.ncbi.nlm.nih.gov/111/");
        assert!((snippets[0].confidence - 0.9).abs() < 1e-6);
        assert_eq!(snippets[1].title, "Beta blockers after myocardial infarction");
        assert!((snippets[1].confidence - 0.8).abs() < 1e-6);
        assert_eq!(snippets[1].source_name, "PubMed");

        let seen = seen.lock().unwrap();
        assert_eq!(seen[0]["db"], "pubmed");
        assert_eq!(seen[0]["term"], "beta blocker");
        assert_eq!(seen[0]["retmode"], "json");
        assert_eq!(seen[0]["api_key"], "k123");
        assert_eq!(seen[1]["id"], "111,222");
        assert_eq!(seen[1]["retmode"], "xml");
    }

    #[tokio::test]
    async fn empty_id_list_skips_fetch() {
        let app = Router::new().route(
            "/esearch.fcgi",
            get(|| async { Json(json!({ "esearchresult": { "idlist": [] } })) }),
        );
        let base = serve(app).await;
        let snippets = source_for(&base, None).search("nothing", 5).await.unwrap();
        assert!(snippets.is_empty());
    }

    #[tokio::test]
    async fn fetch_phase_failure_is_an_error() {
        let app = Router::new()
            .route(
                "/esearch.fcgi",
                get(|| async { Json(json!({ "esearchresult": { "idlist": ["1"] } })) }),
            )
            .route(
                "/efetch.fcgi",
                get(|| async { (StatusCode::TOO_MANY_REQUESTS, "slow down") }),
            );
        let base = serve(app).await;
        let err = source_for(&base, None).search("x", 5).await.unwrap_err();
        assert!(matches!(err, LiteratureError::Status { status: 429 }));
    }

    #[tokio::test]
    async fn api_key_is_omitted_without_configuration() {
        let seen = Arc::new(Mutex::new(None::<HashMap<String, String>>));
        let sink = seen.clone();
        let app = Router::new().route(
            "/esearch.fcgi",
            get(move |Query(q): Query<HashMap<String, String>>| {
                let sink = sink.clone();
                async move {
                    *sink.lock().unwrap() = Some(q);
                    Json(json!({ "esearchresult": { "idlist": [] } }))
                }
            }),
        );
        let base = serve(app).await;
        source_for(&base, None).search("x", 3).await.unwrap();
        let q = seen.lock().unwrap().clone().unwrap();
        assert!(!q.contains_key("api_key"));
        assert_eq!(q["retmax"], "3");
    }
}
