use std::path::{Path, PathBuf};

use client::Session;

/// Where and as whom to connect.
pub struct Account {
    pub uri: String,
    pub email: String,
    pub password: String,
}

async fn open(account: &Account) -> Option<Session> {
    match Session::login(&account.uri, &account.email, &account.password).await {
        Ok(s) => Some(s),
        Err(e) => {
            println!("login error: {e}");
            None
        }
    }
}

pub async fn upload(account: &Account, files: &[PathBuf], folder: Option<&str>) {
    let Some(session) = open(account).await else {
        return;
    };
    match session.upload(files, folder).await {
        Ok(reply) => println!("{}. Ids: {:?}", reply.message, reply.ids),
        Err(e) => println!("upload error: {e}"),
    }
}

pub async fn list(account: &Account) {
    let Some(session) = open(account).await else {
        return;
    };
    match session.files().await {
        Ok(files) => client::print_files(&files),
        Err(e) => println!("list error: {e}"),
    }
}

pub async fn download(account: &Account, id: i64, dir: &Path) {
    let Some(session) = open(account).await else {
        return;
    };
    match session.download(id, dir).await {
        Ok(path) => println!("file {id} saved to {}", path.display()),
        Err(e) => println!("download error: {e}"),
    }
}

pub async fn delete(account: &Account, id: i64) {
    let Some(session) = open(account).await else {
        return;
    };
    match session.delete(id).await {
        Ok(reply) => println!("{}", reply.message),
        Err(e) => println!("delete error: {e}"),
    }
}

pub async fn create_folder(account: &Account, name: &str) {
    let Some(session) = open(account).await else {
        return;
    };
    match session.create_folder(name).await {
        Ok(reply) => println!("{}", reply.message),
        Err(e) => println!("folder error: {e}"),
    }
}
