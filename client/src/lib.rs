use std::path::{Path, PathBuf};

use comfy_table::{presets::UTF8_HORIZONTAL_ONLY, Attribute, Cell, ContentArrangement, Table};
use futures::StreamExt;
use kernel::{CreateFolder, ErrorReply, FileEntry, Message, UploadReply};
use reqwest::header::{CONTENT_DISPOSITION, LOCATION};
use reqwest::multipart::{Form, Part};
use reqwest::redirect::Policy;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio_util::io::ReaderStream;
use url::Url;

const FILES_FIELD: &str = "files";
const FOLDER_FIELD: &str = "folder";
const DOWNLOADED: &str = "download";

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid server uri: {0}")]
    Uri(#[from] url::ParseError),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("login refused with status {0}")]
    LoginRefused(StatusCode),
    #[error("session is missing or expired")]
    NoSession,
    #[error("server replied {status}: {message}")]
    Server { status: StatusCode, message: String },
}

/// Logged in connection to a filebox server.
pub struct Session {
    client: Client,
    base: Url,
}

impl Session {
    /// Opens a session with email and password credentials.
    pub async fn login(uri: &str, email: &str, password: &str) -> Result<Self, Error> {
        let client = Client::builder()
            .cookie_store(true)
            .redirect(Policy::none())
            .build()?;
        let base = Url::parse(uri)?;

        let response = client
            .post(endpoint(&base, "login")?)
            .form(&[("email", email), ("password", password)])
            .send()
            .await?;
        let accepted = response.status() == StatusCode::SEE_OTHER
            && response
                .headers()
                .get(LOCATION)
                .is_some_and(|l| *l == "/dashboard");
        if !accepted {
            return Err(Error::LoginRefused(response.status()));
        }
        Ok(Self { client, base })
    }

    /// Streams local files to the server, labelled with `folder` when given.
    pub async fn upload(
        &self,
        files: &[PathBuf],
        folder: Option<&str>,
    ) -> Result<UploadReply, Error> {
        let mut form = Form::new();
        for path in files {
            let f = File::open(path).await?;
            let len = f.metadata().await?.len();
            let name = path
                .file_name()
                .map_or_else(|| DOWNLOADED.to_owned(), |n| n.to_string_lossy().into_owned());
            let body = reqwest::Body::wrap_stream(ReaderStream::new(f));
            form = form.part(FILES_FIELD, Part::stream_with_length(body, len).file_name(name));
        }
        if let Some(folder) = folder {
            form = form.text(FOLDER_FIELD, folder.to_owned());
        }

        let response = self
            .client
            .post(self.endpoint("upload")?)
            .multipart(form)
            .send()
            .await?;
        reply(response).await
    }

    pub async fn files(&self) -> Result<Vec<FileEntry>, Error> {
        let response = self.client.get(self.endpoint("files")?).send().await?;
        reply(response).await
    }

    /// Saves file content into `dir` under its original name. Returns the written path.
    pub async fn download(&self, id: i64, dir: &Path) -> Result<PathBuf, Error> {
        let response = self
            .client
            .get(self.endpoint(&format!("download/{id}"))?)
            .send()
            .await?;
        let response = check(response).await?;

        let name = response
            .headers()
            .get(CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .and_then(attachment_name)
            .unwrap_or_else(|| format!("{DOWNLOADED}-{id}"));
        let target = dir.join(name);

        let mut writer = BufWriter::new(File::create(&target).await?);
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            writer.write_all(&chunk?).await?;
        }
        writer.flush().await?;
        Ok(target)
    }

    pub async fn delete(&self, id: i64) -> Result<Message, Error> {
        let response = self
            .client
            .delete(self.endpoint(&format!("files/{id}"))?)
            .send()
            .await?;
        reply(response).await
    }

    pub async fn create_folder(&self, name: &str) -> Result<Message, Error> {
        let request = CreateFolder {
            folder_name: name.to_owned(),
        };
        let response = self
            .client
            .post(self.endpoint("create-folder")?)
            .json(&request)
            .send()
            .await?;
        reply(response).await
    }

    pub async fn logout(self) -> Result<(), Error> {
        self.client.get(self.endpoint("logout")?).send().await?;
        Ok(())
    }

    fn endpoint(&self, path: &str) -> Result<Url, Error> {
        endpoint(&self.base, path)
    }
}

pub fn print_files(files: &[FileEntry]) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_HORIZONTAL_ONLY)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_width(120)
        .set_header(vec![
            Cell::new("Id").add_attribute(Attribute::Bold),
            Cell::new("Name").add_attribute(Attribute::Bold),
            Cell::new("Size").add_attribute(Attribute::Bold),
            Cell::new("Folder").add_attribute(Attribute::Bold),
            Cell::new("Uploaded").add_attribute(Attribute::Bold),
            Cell::new("Owner").add_attribute(Attribute::Bold),
        ]);

    for f in files {
        table.add_row(vec![
            Cell::new(f.id),
            Cell::new(&f.originalname),
            Cell::new(f.size),
            Cell::new(&f.folder),
            Cell::new(&f.uploaded_at),
            Cell::new(f.user_email.as_deref().unwrap_or_default()),
        ]);
    }
    println!("{table}");
}

fn endpoint(base: &Url, path: &str) -> Result<Url, Error> {
    let mut url = base.clone();
    if !url.path().ends_with('/') {
        let dir = format!("{}/", url.path());
        url.set_path(&dir);
    }
    Ok(url.join(path.trim_start_matches('/'))?)
}

fn attachment_name(header: &str) -> Option<String> {
    let (_, rest) = header.split_once("filename=")?;
    let name = rest.trim().trim_matches('"');
    let name = match name.rfind(&['\\', '/']) {
        Some(ix) => &name[ix + 1..],
        None => name,
    };
    if name.is_empty() || name == ".." {
        None
    } else {
        Some(name.to_owned())
    }
}

async fn check(response: Response) -> Result<Response, Error> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::SEE_OTHER {
        return Err(Error::NoSession);
    }
    let message = match response.json::<ErrorReply>().await {
        Ok(r) => r.error,
        Err(_) => status.canonical_reason().unwrap_or_default().to_owned(),
    };
    Err(Error::Server { status, message })
}

async fn reply<T: DeserializeOwned>(response: Response) -> Result<T, Error> {
    Ok(check(response).await?.json().await?)
}
