//! Robots.txt parser implementation
//!
//! Allow/disallow matching is delegated to the robotstxt crate; crawl-delay,
//! sitemap and raw rule lines are read directly since the matcher does not
//! expose them.

use robotstxt::DefaultMatcher;

/// A single `Allow:` or `Disallow:` line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RobotsRule {
    pub allow: bool,
    pub path: String,
}

/// Parsed robots.txt data
#[derive(Debug, Clone)]
pub struct ParsedRobots {
    /// Raw robots.txt content (empty string means allow all)
    content: String,
    /// Whether to allow all (true = allow all, false = parse content)
    allow_all: bool,
}

impl ParsedRobots {
    /// Creates a new ParsedRobots from raw robots.txt content
    pub fn from_content(content: &str) -> Self {
        Self {
            content: content.to_string(),
            allow_all: false,
        }
    }

    /// Creates a permissive ParsedRobots that allows everything
    ///
    /// This is used when robots.txt is missing or cannot be fetched.
    pub fn allow_all() -> Self {
        Self {
            content: String::new(),
            allow_all: true,
        }
    }

    /// Returns the raw robots.txt content
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Checks if a URL is allowed for the given user agent token
    ///
    /// # Arguments
    ///
    /// * `url` - The absolute URL to check
    /// * `user_agent` - The product token matched against `User-agent:` groups
    ///
    /// # Returns
    ///
    /// * `true` - If the URL is allowed
    /// * `false` - If the URL is disallowed
    pub fn is_allowed(&self, url: &str, user_agent: &str) -> bool {
        if self.allow_all || self.content.is_empty() {
            return true;
        }

        let mut matcher = DefaultMatcher::default();
        matcher.one_agent_allowed_by_robots(&self.content, user_agent, url)
    }

    /// Gets the crawl delay in seconds for a specific user agent
    ///
    /// A group naming the agent wins over the `*` group.
    ///
    /// # Arguments
    ///
    /// * `user_agent` - The product token to look up
    ///
    /// # Returns
    ///
    /// * `Some(f64)` - The crawl delay in seconds if specified
    /// * `None` - If no crawl delay applies to this agent
    pub fn crawl_delay(&self, user_agent: &str) -> Option<f64> {
        if self.allow_all || self.content.is_empty() {
            return None;
        }

        let agent = user_agent.to_lowercase();
        let mut group: Vec<String> = Vec::new();
        let mut group_open = true;
        let mut delay_for_wildcard = None;
        let mut delay_for_agent = None;

        for (key, value) in directives(&self.content) {
            match key.as_str() {
                "user-agent" => {
                    // A user-agent line after any rule starts a new group
                    if !group_open {
                        group.clear();
                        group_open = true;
                    }
                    group.push(value.to_lowercase());
                }
                "crawl-delay" => {
                    group_open = false;
                    let Ok(delay) = value.parse::<f64>() else {
                        continue;
                    };
                    if group.iter().any(|ua| ua != "*" && agent.contains(ua.as_str())) {
                        delay_for_agent = Some(delay);
                    } else if group.iter().any(|ua| ua == "*") {
                        delay_for_wildcard = Some(delay);
                    }
                }
                _ => group_open = false,
            }
        }

        delay_for_agent.or(delay_for_wildcard)
    }

    /// Returns every `Sitemap:` URL listed in the file
    pub fn sitemaps(&self) -> Vec<String> {
        directives(&self.content)
            .filter(|(key, _)| key == "sitemap")
            .map(|(_, value)| value)
            .filter(|value| !value.is_empty())
            .collect()
    }

    /// Returns every `Allow:` and `Disallow:` line regardless of group
    pub fn rules(&self) -> Vec<RobotsRule> {
        directives(&self.content)
            .filter_map(|(key, value)| match key.as_str() {
                "allow" if !value.is_empty() => Some(RobotsRule {
                    allow: true,
                    path: value,
                }),
                "disallow" if !value.is_empty() => Some(RobotsRule {
                    allow: false,
                    path: value,
                }),
                _ => None,
            })
            .collect()
    }
}

/// Iterates `(lowercase key, value)` pairs, skipping comments and blanks
fn directives(content: &str) -> impl Iterator<Item = (String, String)> + '_ {
    content.lines().filter_map(|line| {
        let line = line.split('#').next().unwrap_or("").trim();
        if line.is_empty() {
            return None;
        }
        let (key, value) = line.split_once(':')?;
        Some((key.trim().to_lowercase(), value.trim().to_string()))
    })
}
