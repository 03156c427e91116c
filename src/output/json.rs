//! JSON corpus writer
//!
//! One document per article at `{corpus_dir}/{article_id}.json`, holding the
//! article, its comments in canonical order and a threaded reading listing.

use crate::crawler::threaded_order;
use crate::model::{Article, Comment};
use crate::output::traits::{ArticleSink, OutputResult};
use serde::Serialize;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

#[derive(Serialize)]
struct ArticleDocument<'a> {
    article: &'a Article,
    comment_count: usize,
    comments: &'a [Comment],
    thread: Vec<ThreadLine<'a>>,
}

#[derive(Serialize)]
struct ThreadLine<'a> {
    id: &'a str,
    depth: u32,
}

/// Writes each article as a pretty-printed JSON file
pub struct JsonArticleWriter {
    corpus_dir: PathBuf,
}

impl JsonArticleWriter {
    pub fn new(corpus_dir: impl Into<PathBuf>) -> Self {
        Self {
            corpus_dir: corpus_dir.into(),
        }
    }

    pub fn path_for(&self, article: &Article) -> PathBuf {
        self.corpus_dir.join(format!("{}.json", article.id))
    }
}

impl ArticleSink for JsonArticleWriter {
    fn write_article(&self, article: &Article, comments: &[Comment]) -> OutputResult<PathBuf> {
        fs::create_dir_all(&self.corpus_dir)?;

        let thread = threaded_order(comments)
            .into_iter()
            .map(|entry| ThreadLine {
                id: comments[entry.index].id.as_str(),
                depth: entry.display_depth,
            })
            .collect();
        let document = ArticleDocument {
            article,
            comment_count: comments.len(),
            comments,
            thread,
        };

        let path = self.path_for(article);
        let partial = path.with_extension("json.part");
        write_document(&partial, &document)?;
        fs::rename(&partial, &path)?;

        Ok(path)
    }
}

fn write_document(path: &Path, document: &ArticleDocument<'_>) -> OutputResult<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, document)?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::merge;
    use tempfile::TempDir;

    fn article() -> Article {
        Article {
            id: "20200314_post".to_string(),
            url: "https://e.com/2020/03/14/post/".to_string(),
            title: "Post".to_string(),
            author: "Jane".to_string(),
            date_published: None,
            categories: vec!["News".to_string()],
            tags: Vec::new(),
            content_html: "<p>Body</p>".to_string(),
            content_text: "Body".to_string(),
            comment_count: 2,
        }
    }

    #[test]
    fn test_writes_document_with_thread() {
        let dir = TempDir::new().unwrap();
        let writer = JsonArticleWriter::new(dir.path().join("corpus"));
        let article = article();
        let comments = merge(vec![
            Comment::new("5", &article.url).with_text("root"),
            Comment::new("9", &article.url).with_parent("5").with_text("reply"),
        ]);

        let path = writer.write_article(&article, &comments).unwrap();
        assert_eq!(path, dir.path().join("corpus").join("20200314_post.json"));

        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["article"]["title"], "Post");
        assert_eq!(value["comment_count"], 2);
        assert_eq!(value["comments"][1]["depth"], 1);
        assert_eq!(value["thread"][1]["id"], "9");
        assert_eq!(value["thread"][1]["depth"], 1);
    }

    #[test]
    fn test_rewrite_replaces_file() {
        let dir = TempDir::new().unwrap();
        let writer = JsonArticleWriter::new(dir.path());
        let article = article();

        writer
            .write_article(&article, &[Comment::new("1", &article.url)])
            .unwrap();
        let path = writer.write_article(&article, &[]).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["comment_count"], 0);
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}
