use std::fmt;

use quick_xml::escape::escape;

/// 单个 HTTP 请求定义，对应 `.webtest` 文件中的一个 `Request` 元素
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    /// 请求 URL，可以包含 `{...}` 表达式
    pub url: String,

    /// HTTP 方法，缺省为 GET；执行阶段只接受 GET/POST
    pub method: String,

    /// 人类可读的请求描述
    pub description: String,

    /// Header 列表，保持原始顺序，允许重复
    pub headers: Vec<(String, String)>,

    /// 参数列表，保持原始顺序
    pub parameters: Vec<(String, String)>,

    /// 请求体原始文本；POST 时与 parameters 互斥生效
    pub body: String,

    /// Capture 块原始文本，包含零或多个捕获表达式
    pub capture: String,

    /// 请求在文件中的行号（用于错误报告）
    pub line_number: usize,
}

impl Request {
    /// 创建一个新请求；`method` 为空时默认为 GET
    pub fn new(url: impl Into<String>, method: impl Into<String>, line_number: usize) -> Self {
        let method: String = method.into();
        Self {
            url: url.into(),
            method: if method.is_empty() {
                "GET".to_string()
            } else {
                method
            },
            description: String::new(),
            headers: Vec::new(),
            parameters: Vec::new(),
            body: String::new(),
            capture: String::new(),
            line_number,
        }
    }

    /// 追加一个 header
    ///
    /// Name 为空或 Value 缺失时不记录（Value 可以为空串）
    pub fn add_header(&mut self, name: Option<String>, value: Option<String>) {
        Self::add_pair(&mut self.headers, name, value);
    }

    /// 追加一个参数，过滤规则同 `add_header`
    pub fn add_parameter(&mut self, name: Option<String>, value: Option<String>) {
        Self::add_pair(&mut self.parameters, name, value);
    }

    fn add_pair(to: &mut Vec<(String, String)>, name: Option<String>, value: Option<String>) {
        if let (Some(name), Some(value)) = (name, value) {
            if !name.is_empty() {
                to.push((name, value));
            }
        }
    }

    /// Capture 块拆成非空、去除首尾空白的行
    pub fn captures(&self) -> Vec<&str> {
        self.capture
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect()
    }
}

impl fmt::Display for Request {
    /// 单行摘要: `描述: METHOD host/path {'name': 'value', ...}`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.description.is_empty() {
            write!(f, "{}: ", self.description)?;
        }
        write!(f, "{}", self.method)?;

        match url::Url::parse(&self.url) {
            Ok(parsed) => write!(
                f,
                " {}{}",
                parsed.host_str().unwrap_or(""),
                parsed.path()
            )?,
            Err(_) => write!(f, " {}", self.url)?,
        }

        let params: Vec<String> = self
            .parameters
            .iter()
            .map(|(name, value)| format!("'{}': '{}'", name, value))
            .collect();
        write!(f, " {{{}}}", params.join(", "))
    }
}

/// 一个 `.webtest` 文档：有序的请求序列
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    /// 来源文件名；内存中构建的文档为空串
    pub filename: String,

    /// 解析出的所有请求，按文件中的出现顺序
    pub requests: Vec<Request>,
}

impl Document {
    /// 创建一个空文档
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置来源文件名
    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = filename.into();
        self
    }

    /// 添加一个请求
    pub fn add_request(&mut self, request: Request) {
        self.requests.push(request);
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// 重新序列化为 `.webtest` XML
    pub fn to_webtest_xml(&self) -> String {
        let mut out = String::from("<WebTest>\n");
        for request in &self.requests {
            out.push_str(&format!(
                "  <Request Method=\"{}\" Url=\"{}\">\n",
                escape(&request.method),
                escape(&request.url)
            ));
            if !request.description.is_empty() {
                out.push_str(&format!(
                    "    <Description>{}</Description>\n",
                    escape(&request.description)
                ));
            }
            if !request.headers.is_empty() {
                out.push_str("    <Headers>\n");
                for (name, value) in &request.headers {
                    out.push_str(&format!(
                        "      <Header Name=\"{}\" Value=\"{}\" />\n",
                        escape(name),
                        escape(value)
                    ));
                }
                out.push_str("    </Headers>\n");
            }
            for (name, value) in &request.parameters {
                out.push_str(&format!(
                    "    <FormPostParameter Name=\"{}\" Value=\"{}\" />\n",
                    escape(name),
                    escape(value)
                ));
            }
            if !request.body.is_empty() {
                out.push_str(&format!(
                    "    <StringHttpBody>{}</StringHttpBody>\n",
                    escape(&request.body)
                ));
            }
            if !request.capture.is_empty() {
                out.push_str(&format!(
                    "    <Capture>{}</Capture>\n",
                    escape(&request.capture)
                ));
            }
            out.push_str("  </Request>\n");
        }
        out.push_str("</WebTest>\n");
        out
    }
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.requests.is_empty() {
            return write!(f, "Webtest: {} (empty)", self.filename);
        }
        let requests: Vec<String> = self.requests.iter().map(|r| r.to_string()).collect();
        write!(f, "Webtest: {}\n\n{}", self.filename, requests.join("\n\n"))
    }
}

/// 解析错误类型；除 IO 外都属于 MalformedDocument
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    /// XML 本身格式错误
    #[error("Malformed XML at byte {position}: {message}")]
    Malformed { position: u64, message: String },

    /// 元素出现在 Request 上下文之外
    #[error("{element} not inside Request (line {line})")]
    OutsideRequest { element: String, line: usize },

    /// 字符数据出现在任何可识别的容器元素之外
    #[error("Character data outside any recognized element (line {line})")]
    StrayContent { line: usize },

    /// IO 错误
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// 解析结果类型别名
pub type ParseResult<T> = Result<T, ParseError>;
