use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::time::Duration;

use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use reqwest::StatusCode;
use reqwest::blocking::{Client, Response};
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};

use crate::config::ConnectionConfig;
use crate::domain::{Artifact, Project, Sample, Udfs, Well};
use crate::error::ClarityError;

pub trait LimsClient: Send + Sync {
    /// Web root of the LIMS, used to build links back into the Clarity UI.
    fn base_uri(&self) -> &str;
    fn samples_by_name(&self, name: &str) -> Result<Vec<Sample>, ClarityError>;
    fn sample_by_id(&self, id: &str) -> Result<Option<Sample>, ClarityError>;
    fn project_samples(&self, project_name: &str) -> Result<Vec<Sample>, ClarityError>;
    fn artifacts_for_sample(
        &self,
        sample_name: &str,
        process_type: &str,
    ) -> Result<Vec<Artifact>, ClarityError>;
    fn container_placements(
        &self,
        container_id: &str,
    ) -> Result<BTreeMap<Well, Artifact>, ClarityError>;
    fn process_inputs(&self, process_id: &str) -> Result<Vec<Artifact>, ClarityError>;
}

pub struct ClarityHttpClient {
    client: Client,
    base_uri: String,
    api_root: String,
    username: String,
    password: String,
    projects: Mutex<HashMap<String, Project>>,
    samples: Mutex<HashMap<String, Sample>>,
}

impl ClarityHttpClient {
    pub fn new(config: &ConnectionConfig) -> Result<Self, ClarityError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("clarity-report/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| ClarityError::LimsHttp(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|err| ClarityError::LimsHttp(err.to_string()))?;

        let base_uri = config.base_uri.trim_end_matches('/').to_string();
        Ok(Self {
            client,
            api_root: format!("{base_uri}/api/{}", config.version),
            base_uri,
            username: config.username.clone(),
            password: config.password.clone(),
            projects: Mutex::new(HashMap::new()),
            samples: Mutex::new(HashMap::new()),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.api_root, path)
    }

    fn get(&self, url: &str, query: &[(&str, &str)]) -> Result<Response, ClarityError> {
        self.client
            .get(url)
            .query(query)
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .map_err(|err| ClarityError::LimsHttp(err.to_string()))
    }

    fn handle_status(response: Response) -> Result<Response, ClarityError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let message = response
            .text()
            .unwrap_or_else(|_| "Clarity request failed".to_string());
        Err(ClarityError::LimsStatus { status, message })
    }

    fn fetch_xml(&self, url: &str, query: &[(&str, &str)]) -> Result<Option<String>, ClarityError> {
        let response = self.get(url, query)?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = Self::handle_status(response)?;
        response
            .text()
            .map(Some)
            .map_err(|err| ClarityError::LimsHttp(err.to_string()))
    }

    fn require_xml(&self, url: &str) -> Result<String, ClarityError> {
        self.fetch_xml(url, &[])?
            .ok_or_else(|| ClarityError::LimsStatus {
                status: StatusCode::NOT_FOUND.as_u16(),
                message: format!("{url} not found"),
            })
    }

    fn list(&self, path: &str, query: &[(&str, &str)]) -> Result<Vec<String>, ClarityError> {
        let mut ids = Vec::new();
        let mut next = Some((self.url(path), query.to_vec()));
        while let Some((url, query)) = next.take() {
            let Some(xml) = self.fetch_xml(&url, &query)? else {
                break;
            };
            let page = parse_links(&xml)?;
            ids.extend(page.ids);
            next = page.next_page.map(|uri| (uri, Vec::new()));
        }
        Ok(ids)
    }

    fn project(&self, id: &str) -> Result<Project, ClarityError> {
        if let Some(project) = lock(&self.projects).get(id) {
            return Ok(project.clone());
        }
        let xml = self.require_xml(&self.url(&format!("projects/{id}")))?;
        let project = parse_project(&xml)?;
        lock(&self.projects).insert(id.to_string(), project.clone());
        Ok(project)
    }

    fn load_sample(&self, id: &str) -> Result<Option<Sample>, ClarityError> {
        if let Some(sample) = lock(&self.samples).get(id) {
            return Ok(Some(sample.clone()));
        }
        let Some(xml) = self.fetch_xml(&self.url(&format!("samples/{id}")), &[])? else {
            return Ok(None);
        };
        let record = parse_sample(&xml)?;
        let project = record
            .project_id
            .as_deref()
            .map(|project_id| self.project(project_id))
            .transpose()?;
        let sample = Sample {
            id: record.id,
            name: record.name.clone(),
            lims_name: record.name,
            project,
            udf: record.udf,
        };
        lock(&self.samples).insert(id.to_string(), sample.clone());
        Ok(Some(sample))
    }

    fn samples_from_ids(&self, ids: Vec<String>) -> Result<Vec<Sample>, ClarityError> {
        let mut samples = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(sample) = self.load_sample(&id)? {
                samples.push(sample);
            }
        }
        Ok(samples)
    }

    fn artifact(&self, id: &str) -> Result<Artifact, ClarityError> {
        let xml = self.require_xml(&self.url(&format!("artifacts/{id}")))?;
        parse_artifact(&xml)
    }
}

impl LimsClient for ClarityHttpClient {
    fn base_uri(&self) -> &str {
        &self.base_uri
    }

    fn samples_by_name(&self, name: &str) -> Result<Vec<Sample>, ClarityError> {
        let ids = self.list("samples", &[("name", name)])?;
        self.samples_from_ids(ids)
    }

    fn sample_by_id(&self, id: &str) -> Result<Option<Sample>, ClarityError> {
        if id.trim().is_empty() {
            return Ok(None);
        }
        self.load_sample(id)
    }

    fn project_samples(&self, project_name: &str) -> Result<Vec<Sample>, ClarityError> {
        let ids = self.list("samples", &[("projectname", project_name)])?;
        self.samples_from_ids(ids)
    }

    fn artifacts_for_sample(
        &self,
        sample_name: &str,
        process_type: &str,
    ) -> Result<Vec<Artifact>, ClarityError> {
        let ids = self.list(
            "artifacts",
            &[("sample-name", sample_name), ("process-type", process_type)],
        )?;
        ids.iter().map(|id| self.artifact(id)).collect()
    }

    fn container_placements(
        &self,
        container_id: &str,
    ) -> Result<BTreeMap<Well, Artifact>, ClarityError> {
        let Some(xml) = self.fetch_xml(&self.url(&format!("containers/{container_id}")), &[])?
        else {
            return Ok(BTreeMap::new());
        };
        parse_placements(&xml)?
            .into_iter()
            .map(|(well, artifact_id)| -> Result<(Well, Artifact), ClarityError> {
                Ok((well, self.artifact(&artifact_id)?))
            })
            .collect()
    }

    fn process_inputs(&self, process_id: &str) -> Result<Vec<Artifact>, ClarityError> {
        let xml = self.require_xml(&self.url(&format!("processes/{process_id}")))?;
        parse_process_inputs(&xml)?
            .iter()
            .map(|id| self.artifact(id))
            .collect()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// One page of a list endpoint: entity ids and the next page, if any.
#[derive(Debug, Clone, Default)]
pub struct LinkPage {
    pub ids: Vec<String>,
    pub next_page: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleRecord {
    pub id: String,
    pub name: String,
    pub project_id: Option<String>,
    pub udf: Udfs,
}

/// Minimal element tree; namespaces are dropped and only local names kept.
#[derive(Debug, Clone, Default)]
pub struct XmlElement {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub text: String,
    pub children: Vec<XmlElement>,
}

impl XmlElement {
    fn open(start: &BytesStart<'_>) -> Result<Self, ClarityError> {
        let mut attributes = Vec::new();
        for attr in start.attributes() {
            let attr = attr.map_err(|err| ClarityError::LimsPayload(err.to_string()))?;
            let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
            let value = attr
                .unescape_value()
                .map_err(|err| ClarityError::LimsPayload(err.to_string()))?
                .into_owned();
            attributes.push((key, value));
        }
        Ok(Self {
            name: String::from_utf8_lossy(start.local_name().as_ref()).into_owned(),
            attributes,
            text: String::new(),
            children: Vec::new(),
        })
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.as_str())
    }

    pub fn child(&self, name: &str) -> Option<&XmlElement> {
        self.children.iter().find(|child| child.name == name)
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlElement> {
        self.children.iter().filter(move |child| child.name == name)
    }

    pub fn child_text(&self, name: &str) -> Option<&str> {
        self.child(name).map(|child| child.text.as_str())
    }

    /// LIMS id from `limsid`, falling back to the last segment of `uri`.
    pub fn lims_id(&self) -> Option<String> {
        if let Some(id) = self.attr("limsid").filter(|id| !id.is_empty()) {
            return Some(id.to_string());
        }
        self.attr("uri")
            .map(|uri| uri.split('?').next().unwrap_or(uri))
            .and_then(|uri| uri.trim_end_matches('/').rsplit('/').next())
            .filter(|id| !id.is_empty())
            .map(str::to_string)
    }

    fn udfs(&self) -> Udfs {
        self.children_named("field")
            .filter_map(|field| {
                field
                    .attr("name")
                    .map(|name| (name.to_string(), field.text.clone()))
            })
            .collect()
    }
}

pub fn parse_document(xml: &str) -> Result<XmlElement, ClarityError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut stack: Vec<XmlElement> = Vec::new();

    loop {
        let event = reader
            .read_event()
            .map_err(|err| ClarityError::LimsPayload(err.to_string()))?;
        match event {
            Event::Start(start) => stack.push(XmlElement::open(&start)?),
            Event::Empty(start) => {
                let element = XmlElement::open(&start)?;
                match stack.last_mut() {
                    Some(parent) => parent.children.push(element),
                    None => return Ok(element),
                }
            }
            Event::Text(text) => {
                if let Some(current) = stack.last_mut() {
                    let text = text
                        .unescape()
                        .map_err(|err| ClarityError::LimsPayload(err.to_string()))?;
                    current.text.push_str(&text);
                }
            }
            Event::CData(data) => {
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&String::from_utf8_lossy(&data));
                }
            }
            Event::End(_) => {
                let element = stack.pop().ok_or_else(|| {
                    ClarityError::LimsPayload("unbalanced closing tag".to_string())
                })?;
                match stack.last_mut() {
                    Some(parent) => parent.children.push(element),
                    None => return Ok(element),
                }
            }
            Event::Eof => {
                return Err(ClarityError::LimsPayload(
                    "document ended before the root element closed".to_string(),
                ));
            }
            _ => {}
        }
    }
}

fn expect_root(xml: &str, name: &str) -> Result<XmlElement, ClarityError> {
    let root = parse_document(xml)?;
    if root.name != name {
        return Err(ClarityError::LimsPayload(format!(
            "expected <{name}>, got <{}>",
            root.name
        )));
    }
    Ok(root)
}

fn required_id(element: &XmlElement) -> Result<String, ClarityError> {
    element.lims_id().ok_or_else(|| {
        ClarityError::LimsPayload(format!("<{}> without limsid or uri", element.name))
    })
}

pub fn parse_links(xml: &str) -> Result<LinkPage, ClarityError> {
    let root = parse_document(xml)?;
    let mut page = LinkPage::default();
    for child in &root.children {
        if child.name == "next-page" {
            page.next_page = child.attr("uri").map(str::to_string);
            continue;
        }
        if let Some(id) = child.lims_id() {
            page.ids.push(id);
        }
    }
    Ok(page)
}

pub fn parse_sample(xml: &str) -> Result<SampleRecord, ClarityError> {
    let root = expect_root(xml, "sample")?;
    Ok(SampleRecord {
        id: required_id(&root)?,
        name: root.child_text("name").unwrap_or_default().to_string(),
        project_id: root.child("project").and_then(XmlElement::lims_id),
        udf: root.udfs(),
    })
}

pub fn parse_project(xml: &str) -> Result<Project, ClarityError> {
    let root = expect_root(xml, "project")?;
    Ok(Project {
        id: required_id(&root)?,
        name: root.child_text("name").unwrap_or_default().to_string(),
        udf: root.udfs(),
    })
}

pub fn parse_artifact(xml: &str) -> Result<Artifact, ClarityError> {
    let root = expect_root(xml, "artifact")?;
    Ok(Artifact {
        id: required_id(&root)?,
        name: root.child_text("name").unwrap_or_default().to_string(),
        parent_process: root.child("parent-process").and_then(XmlElement::lims_id),
        sample_ids: root
            .children_named("sample")
            .filter_map(XmlElement::lims_id)
            .collect(),
        udf: root.udfs(),
    })
}

pub fn parse_placements(xml: &str) -> Result<Vec<(Well, String)>, ClarityError> {
    let root = expect_root(xml, "container")?;
    root.children_named("placement")
        .map(|placement| -> Result<(Well, String), ClarityError> {
            let well: Well = placement
                .child_text("value")
                .ok_or_else(|| ClarityError::LimsPayload("placement without value".to_string()))?
                .parse()?;
            Ok((well, required_id(placement)?))
        })
        .collect()
}

/// Distinct input artifact ids of a process, in document order.
pub fn parse_process_inputs(xml: &str) -> Result<Vec<String>, ClarityError> {
    let root = expect_root(xml, "process")?;
    let mut inputs: Vec<String> = Vec::new();
    for map in root.children_named("input-output-map") {
        if let Some(id) = map.child("input").and_then(XmlElement::lims_id) {
            if !inputs.contains(&id) {
                inputs.push(id);
            }
        }
    }
    Ok(inputs)
}
