pub mod types;
pub mod webtest_file;

// Re-export commonly used types
pub use types::{Document, ParseError, ParseResult, Request};
pub use webtest_file::WebtestParser;

/// 从文件路径解析 `.webtest` 文件
pub fn parse_file<P: AsRef<std::path::Path>>(path: P) -> ParseResult<Document> {
    WebtestParser::parse_file(path)
}

/// 从字符串内容解析 `.webtest` 文档
pub fn parse_content(content: &str) -> ParseResult<Document> {
    WebtestParser::parse_content(content)
}
