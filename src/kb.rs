use std::{
    collections::{HashMap, HashSet},
    fs,
    path::Path,
};

use anyhow::{Context, Result};

/// One retrievable unit of the knowledge base: a `## ` section of a
/// markdown file, or a whole file when it has no section headings.
#[derive(Debug, Clone)]
pub struct KbDocument {
    pub id: usize,
    pub heading: String,
    pub text: String,
    pub source_title: String,
}

#[derive(Debug, Clone)]
pub struct SearchHit {
    pub document: KbDocument,
    pub score: f64,
}

/// TF-IDF index over the knowledge corpus. Built once per load and
/// immutable afterwards; corpus changes require a full rebuild.
#[derive(Debug)]
pub struct KbIndex {
    documents: Vec<KbDocument>,
    /// L2-normalized tf-idf weights per document.
    vectors: Vec<HashMap<String, f64>>,
    idf: HashMap<String, f64>,
}

impl KbIndex {
    /// Read every `*.md` under `dir` (file-name order) and index its
    /// sections.
    pub fn load(dir: &Path) -> Result<Self> {
        let mut paths = Vec::new();
        let entries = fs::read_dir(dir)
            .with_context(|| format!("Failed to read knowledge base dir {}", dir.display()))?;
        for entry in entries {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "md") {
                paths.push(path);
            }
        }
        paths.sort();

        let mut documents = Vec::new();
        for path in &paths {
            let text = fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let source_title = path
                .file_name()
                .map(|name| name.to_string_lossy().to_string())
                .unwrap_or_default();
            for (heading, body) in split_sections(&source_title, &text) {
                documents.push(KbDocument {
                    id: documents.len(),
                    heading,
                    text: body,
                    source_title: source_title.clone(),
                });
            }
        }
        Ok(Self::build(documents))
    }

    /// Index a prepared document list. Ids are reassigned to insertion
    /// order, which is also the retrieval tie-break order.
    pub fn build(mut documents: Vec<KbDocument>) -> Self {
        for (id, doc) in documents.iter_mut().enumerate() {
            doc.id = id;
        }

        // Headings are retrievable text too: "What is an aquifer" is
        // the strongest signal that section answers that question.
        let tokenized: Vec<Vec<String>> = documents
            .iter()
            .map(|d| tokenize(&format!("{} {}", d.heading, d.text)))
            .collect();

        let mut document_frequency: HashMap<String, usize> = HashMap::new();
        for tokens in &tokenized {
            let distinct: HashSet<&String> = tokens.iter().collect();
            for term in distinct {
                *document_frequency.entry(term.clone()).or_default() += 1;
            }
        }

        // Smoothed idf, never zero, so every shared term contributes.
        let doc_count = documents.len() as f64;
        let idf: HashMap<String, f64> = document_frequency
            .into_iter()
            .map(|(term, df)| {
                let weight = ((1.0 + doc_count) / (1.0 + df as f64)).ln() + 1.0;
                (term, weight)
            })
            .collect();

        let vectors = tokenized
            .iter()
            .map(|tokens| {
                let mut weights: HashMap<String, f64> = HashMap::new();
                for term in tokens {
                    *weights.entry(term.clone()).or_default() += 1.0;
                }
                for (term, weight) in weights.iter_mut() {
                    *weight *= idf.get(term).copied().unwrap_or(0.0);
                }
                l2_normalize(weights)
            })
            .collect();

        Self {
            documents,
            vectors,
            idf,
        }
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Top-k documents for a question, best first. The score is
    /// `(matched terms + tf-idf cosine) / (question terms + 1)`: term
    /// coverage dominates, so more shared terms always outrank fewer,
    /// and the cosine orders documents with equal coverage. Ties break
    /// by corpus insertion order. Documents sharing no term are never
    /// returned.
    pub fn search(&self, question: &str, k: usize) -> Vec<SearchHit> {
        let terms = tokenize(question);
        if terms.is_empty() || k == 0 {
            return Vec::new();
        }
        let distinct_terms: HashSet<&String> = terms.iter().collect();
        let query_vector = {
            let mut weights: HashMap<String, f64> = HashMap::new();
            for term in &terms {
                *weights.entry(term.clone()).or_default() += 1.0;
            }
            for (term, weight) in weights.iter_mut() {
                *weight *= self.idf.get(term).copied().unwrap_or(0.0);
            }
            l2_normalize(weights)
        };

        let mut hits: Vec<SearchHit> = self
            .documents
            .iter()
            .zip(&self.vectors)
            .filter_map(|(doc, vector)| {
                let matched = distinct_terms
                    .iter()
                    .filter(|term| vector.contains_key(term.as_str()))
                    .count();
                if matched == 0 {
                    return None;
                }
                let cosine: f64 = query_vector
                    .iter()
                    .filter_map(|(term, weight)| vector.get(term).map(|w| w * weight))
                    .sum();
                let score = (matched as f64 + cosine) / (distinct_terms.len() as f64 + 1.0);
                Some(SearchHit {
                    document: doc.clone(),
                    score,
                })
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.document.id.cmp(&b.document.id))
        });
        hits.truncate(k.min(self.documents.len()));
        hits
    }
}

/// Split a markdown file into `(heading, body)` sections at `## `
/// headings. A file without headings is one section titled by its file
/// name; text before the first heading is dropped; blank sections are
/// dropped.
fn split_sections(source_title: &str, text: &str) -> Vec<(String, String)> {
    let mut sections: Vec<(String, String)> = Vec::new();
    let mut current: Option<(String, Vec<&str>)> = None;

    for line in text.lines() {
        if let Some(heading) = line.strip_prefix("## ") {
            if let Some((title, body)) = current.take() {
                push_section(&mut sections, title, &body);
            }
            current = Some((heading.trim().to_string(), Vec::new()));
        } else if let Some((_, body)) = current.as_mut() {
            body.push(line);
        }
    }
    if let Some((title, body)) = current.take() {
        push_section(&mut sections, title, &body);
    }

    if sections.is_empty() {
        let body = text.trim();
        if !body.is_empty() {
            sections.push((source_title.to_string(), body.to_string()));
        }
    }
    sections
}

fn push_section(sections: &mut Vec<(String, String)>, title: String, body: &[&str]) {
    let body = body.join("\n").trim().to_string();
    if !body.is_empty() {
        sections.push((title, body));
    }
}

/// Lower-cased alphanumeric tokens with stopwords removed. Everything
/// that is not ASCII alphanumeric separates tokens.
fn tokenize(text: &str) -> Vec<String> {
    text.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                ' '
            }
        })
        .collect::<String>()
        .split_whitespace()
        .filter(|token| token.len() > 1 && !STOPWORDS.contains(token))
        .map(ToString::to_string)
        .collect()
}

fn l2_normalize(mut weights: HashMap<String, f64>) -> HashMap<String, f64> {
    let norm = weights.values().map(|w| w * w).sum::<f64>().sqrt();
    if norm > 0.0 {
        for weight in weights.values_mut() {
            *weight /= norm;
        }
    }
    weights
}

const STOPWORDS: &[&str] = &[
    "about", "above", "after", "again", "all", "also", "an", "and", "any", "are", "as", "at",
    "be", "because", "been", "before", "being", "below", "between", "both", "but", "by", "can",
    "could", "did", "do", "does", "doing", "down", "during", "each", "few", "for", "from",
    "further", "had", "has", "have", "having", "he", "her", "here", "hers", "him", "his", "how",
    "if", "in", "into", "is", "it", "its", "itself", "just", "may", "me", "more", "most", "my",
    "no", "nor", "not", "now", "of", "off", "on", "once", "only", "or", "other", "our", "out",
    "over", "own", "per", "same", "she", "should", "so", "some", "such", "than", "that", "the",
    "their", "them", "then", "there", "these", "they", "this", "those", "through", "to", "too",
    "under", "until", "up", "very", "was", "we", "were", "what", "when", "where", "which",
    "while", "who", "whom", "why", "will", "with", "would", "you", "your",
];

#[cfg(test)]
mod tests {
    use super::{split_sections, tokenize, KbDocument, KbIndex};

    fn doc(heading: &str, text: &str, source: &str) -> KbDocument {
        KbDocument {
            id: 0,
            heading: heading.to_string(),
            text: text.to_string(),
            source_title: source.to_string(),
        }
    }

    fn corpus() -> KbIndex {
        KbIndex::build(vec![
            doc(
                "What is an aquifer",
                "An aquifer is an underground layer of water-bearing permeable rock or \
                 unconsolidated materials from which groundwater can be extracted using a well. \
                 The water table marks the upper surface of an unconfined aquifer.",
                "aquifers.md",
            ),
            doc(
                "Monsoon recharge",
                "Monsoon rainfall recharges shallow groundwater between June and September. \
                 Post-monsoon water levels are typically shallower than pre-monsoon levels.",
                "monsoon_recharge.md",
            ),
            doc(
                "NOC requirements",
                "A No Objection Certificate is required before drilling new extraction wells \
                 in notified areas. Applications are assessed against local extraction limits.",
                "noc_guidance.md",
            ),
        ])
    }

    #[test]
    fn tokenize_lowercases_and_drops_stopwords() {
        assert_eq!(
            tokenize("What is an Aquifer?"),
            vec!["aquifer".to_string()]
        );
        assert_eq!(
            tokenize("Post-monsoon water levels"),
            vec!["post", "monsoon", "water", "levels"]
        );
    }

    #[test]
    fn aquifer_question_ranks_the_definition_first() {
        let hits = corpus().search("What is an aquifer?", 2);
        assert!(!hits.is_empty());
        assert_eq!(hits[0].document.source_title, "aquifers.md");
    }

    #[test]
    fn coverage_superset_never_ranks_below_subset() {
        let index = KbIndex::build(vec![
            doc(
                "partial",
                "Recharge recharge recharge recharge happens yearly.",
                "b.md",
            ),
            doc("full", "An aquifer gains water through recharge.", "a.md"),
        ]);
        let hits = index.search("aquifer recharge", 2);
        assert_eq!(hits[0].document.heading, "full");
        assert!(hits[0].score >= hits[1].score);
    }

    #[test]
    fn blank_questions_return_nothing() {
        let index = corpus();
        assert!(index.search("", 5).is_empty());
        assert!(index.search("   \t", 5).is_empty());
        // All-stopword questions carry no searchable terms either.
        assert!(index.search("what is the", 5).is_empty());
    }

    #[test]
    fn k_is_clamped_to_corpus_size_and_zero_overlap_is_dropped() {
        let hits = corpus().search("groundwater monsoon aquifer certificate", 50);
        assert!(hits.len() <= 3);
        for pair in hits.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }

        let hits = corpus().search("astronomy telescope", 5);
        assert!(hits.is_empty());
    }

    #[test]
    fn equal_scores_keep_insertion_order() {
        let index = KbIndex::build(vec![
            doc("first", "Borewell drilling permits.", "a.md"),
            doc("second", "Borewell drilling permits.", "b.md"),
        ]);
        let hits = index.search("borewell permits", 2);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].document.heading, "first");
        assert_eq!(hits[1].document.heading, "second");
    }

    #[test]
    fn sections_split_on_headings() {
        let text = "intro text\n## Aquifers\nBody one.\n## Recharge\nBody two.\n";
        let sections = split_sections("kb.md", text);
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].0, "Aquifers");
        assert_eq!(sections[0].1, "Body one.");
        assert_eq!(sections[1].0, "Recharge");
    }

    #[test]
    fn heading_free_files_become_one_section() {
        let sections = split_sections("notes.md", "Just one paragraph.\n");
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].0, "notes.md");
    }
}
