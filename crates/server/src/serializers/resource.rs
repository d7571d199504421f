use std::str::FromStr;

use serde::Deserialize;
use url::Url;
use uuid::Uuid;

use super::{choice, goal_reference, nullable, required_text, FieldErrors};
use crate::db::{self, models::Resource};

const URL_SCHEMES: [&str; 4] = ["http", "https", "ftp", "ftps"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ResourceKind {
    Video,
    #[default]
    Article,
    Course,
    Other,
}

impl ResourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKind::Video => "video",
            ResourceKind::Article => "article",
            ResourceKind::Course => "course",
            ResourceKind::Other => "other",
        }
    }
}

impl FromStr for ResourceKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "video" => Ok(ResourceKind::Video),
            "article" => Ok(ResourceKind::Article),
            "course" => Ok(ResourceKind::Course),
            "other" => Ok(ResourceKind::Other),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ResourcePayload {
    #[serde(default, deserialize_with = "nullable")]
    pub goal: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub title: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub url: Option<Option<String>>,
    #[serde(rename = "type", default, deserialize_with = "nullable")]
    pub kind: Option<Option<String>>,
}

#[derive(Debug, Default)]
pub struct ResourceChanges {
    pub goal: Option<String>,
    pub title: Option<String>,
    pub url: Option<String>,
    pub kind: Option<ResourceKind>,
}

/// Absolute URL with a host and one of the web/ftp schemes.
pub fn is_valid_url(raw: &str) -> bool {
    match Url::parse(raw) {
        Ok(url) => URL_SCHEMES.contains(&url.scheme()) && url.host_str().is_some(),
        Err(_) => false,
    }
}

impl ResourcePayload {
    pub fn validate(self, partial: bool, errors: &mut FieldErrors) -> ResourceChanges {
        let goal = goal_reference(errors, self.goal, partial);
        let url = required_text(errors, "url", self.url, partial, 200).filter(|url| {
            let valid = is_valid_url(url);
            if !valid {
                errors.add("url", "Enter a valid URL.");
            }
            valid
        });

        ResourceChanges {
            goal,
            title: required_text(errors, "title", self.title, partial, 255),
            url,
            kind: choice(errors, "type", self.kind),
        }
    }
}

impl ResourceChanges {
    pub fn apply(self, resource: &mut Resource) {
        if let Some(goal) = self.goal {
            resource.goal_id = goal;
        }
        if let Some(title) = self.title {
            resource.title = title;
        }
        if let Some(url) = self.url {
            resource.url = url;
        }
        if let Some(kind) = self.kind {
            resource.kind = kind.as_str().to_string();
        }
    }

    pub fn create(self) -> Resource {
        let mut resource = Resource {
            id: Uuid::new_v4().to_string(),
            goal_id: String::new(),
            title: String::new(),
            url: String::new(),
            kind: ResourceKind::default().as_str().to_string(),
            added_at: db::timestamp(),
        };
        self.apply(&mut resource);
        resource
    }
}
