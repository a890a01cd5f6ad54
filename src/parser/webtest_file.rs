use std::path::Path;

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use crate::parser::types::{Document, ParseError, ParseResult, Request};

/// `.webtest` XML 文件解析器
///
/// 事件流驱动：`Request` 开始时建立"当前请求"游标，header/参数元素
/// 追加到当前请求，Description/StringHttpBody/Capture 的字符数据按块
/// 追加（同一元素的文本可能分多个事件到达），`Request` 结束时入列。
/// 未知元素忽略。
pub struct WebtestParser;

/// 正在累积字符数据的容器元素
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TextTarget {
    Description,
    Body,
    Capture,
}

impl WebtestParser {
    /// 从文件路径解析
    pub fn parse_file<P: AsRef<Path>>(path: P) -> ParseResult<Document> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let mut document = Self::parse_content(&content)?;
        document.filename = path.as_ref().display().to_string();
        Ok(document)
    }

    /// 从字符串内容解析
    pub fn parse_content(content: &str) -> ParseResult<Document> {
        let mut reader = Reader::from_str(content);
        let mut document = Document::new();
        let mut current: Option<Request> = None;
        let mut target: Option<TextTarget> = None;

        loop {
            let position = reader.buffer_position();
            let event = reader.read_event().map_err(|e| ParseError::Malformed {
                position,
                message: e.to_string(),
            })?;
            let position = reader.buffer_position();

            match event {
                Event::Start(e) => {
                    Self::handle_element(content, position, &e, &mut current, &mut target, false)?;
                }
                Event::Empty(e) => {
                    Self::handle_element(content, position, &e, &mut current, &mut target, true)?;
                    // 自闭合的 Request 立即入列
                    if e.name().as_ref() == b"Request" {
                        if let Some(request) = current.take() {
                            document.add_request(request);
                        }
                    }
                }
                Event::End(e) => match e.name().as_ref() {
                    b"Request" => {
                        if let Some(request) = current.take() {
                            document.add_request(request);
                        }
                    }
                    b"Description" | b"StringHttpBody" | b"Capture" => {
                        target = None;
                    }
                    _ => {}
                },
                Event::Text(text) => {
                    let data = text.unescape().map_err(|e| ParseError::Malformed {
                        position,
                        message: e.to_string(),
                    })?;
                    // 元素之间的空白不算内容
                    if data.trim().is_empty() {
                        continue;
                    }
                    Self::append_text(content, position, &data, &mut current, target)?;
                }
                Event::CData(data) => {
                    let data = String::from_utf8_lossy(&data);
                    Self::append_text(content, position, &data, &mut current, target)?;
                }
                Event::Eof => break,
                _ => {}
            }
        }

        Ok(document)
    }

    fn handle_element(
        content: &str,
        position: u64,
        element: &BytesStart<'_>,
        current: &mut Option<Request>,
        target: &mut Option<TextTarget>,
        self_closing: bool,
    ) -> ParseResult<()> {
        let line = line_of(content, position);

        match element.name().as_ref() {
            b"Request" => {
                let url = attribute(element, b"Url", position)?.unwrap_or_default();
                let method = attribute(element, b"Method", position)?.unwrap_or_default();
                *current = Some(Request::new(url, method, line));
            }
            b"Header" => {
                let request = current.as_mut().ok_or_else(|| ParseError::OutsideRequest {
                    element: "Header".to_string(),
                    line,
                })?;
                let name = attribute(element, b"Name", position)?;
                let value = attribute(element, b"Value", position)?;
                request.add_header(name, value);
            }
            b"QueryStringParameter" | b"FormPostParameter" => {
                let request = current.as_mut().ok_or_else(|| ParseError::OutsideRequest {
                    element: String::from_utf8_lossy(element.name().as_ref()).into_owned(),
                    line,
                })?;
                let name = attribute(element, b"Name", position)?;
                let value = attribute(element, b"Value", position)?;
                request.add_parameter(name, value);
            }
            b"Description" if !self_closing => *target = Some(TextTarget::Description),
            b"StringHttpBody" if !self_closing => *target = Some(TextTarget::Body),
            b"Capture" if !self_closing => *target = Some(TextTarget::Capture),
            _ => {}
        }

        Ok(())
    }

    /// 把字符数据追加到当前累积目标；没有目标或没有当前请求都算文档格式错误
    fn append_text(
        content: &str,
        position: u64,
        data: &str,
        current: &mut Option<Request>,
        target: Option<TextTarget>,
    ) -> ParseResult<()> {
        let line = line_of(content, position);
        let Some(target) = target else {
            return Err(ParseError::StrayContent { line });
        };
        let Some(request) = current.as_mut() else {
            return Err(ParseError::OutsideRequest {
                element: format!("{:?}", target),
                line,
            });
        };
        match target {
            TextTarget::Description => request.description.push_str(data),
            TextTarget::Body => request.body.push_str(data),
            TextTarget::Capture => request.capture.push_str(data),
        }
        Ok(())
    }
}

/// 提取属性值；属性本身损坏时报 Malformed
fn attribute(element: &BytesStart<'_>, key: &[u8], position: u64) -> ParseResult<Option<String>> {
    for attr in element.attributes() {
        let attr = attr.map_err(|e| ParseError::Malformed {
            position,
            message: e.to_string(),
        })?;
        if attr.key.as_ref() == key {
            let value = attr.unescape_value().map_err(|e| ParseError::Malformed {
                position,
                message: e.to_string(),
            })?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

/// 字节偏移对应的行号（从 1 开始）
fn line_of(content: &str, position: u64) -> usize {
    let position = (position as usize).min(content.len());
    content[..position].bytes().filter(|b| *b == b'\n').count() + 1
}
