use std::env;
use std::io;
use std::path::{Path, PathBuf};

use kernel::{FileEntry, Message, Role, UploadReply, UserInfo};
use rand::Rng;
use reqwest::header::{CONTENT_DISPOSITION, ETAG, LOCATION};
use reqwest::multipart::{Form, Part};
use reqwest::redirect::Policy;
use reqwest::{Client, StatusCode};
use serial_test::serial;
use server::config::Config;
use server::AppState;
use test_context::{test_context, AsyncTestContext};
use tokio::net::TcpListener;
use tokio::sync::oneshot::{self, Sender};
use tokio::task::JoinHandle;

const TEST_ROOT: &str = "filebox_test";
const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ\
                            abcdefghijklmnopqrstuvwxyz\
                            0123456789_";
const NAME_LEN: usize = 20;
const ADMIN_EMAIL: &str = "admin@example.com";
const ADMIN_PASSWORD: &str = "admin-secret";
const MAX_FILE_SIZE: usize = 1024;
const FORM_LIMIT: usize = 2 * 1024 * 1024;

struct FileboxAsyncContext {
    root: PathBuf,
    uploads: PathBuf,
    state: AppState,
    base: String,
    shutdown: Sender<()>,
    join: JoinHandle<()>,
}

fn random_name() -> String {
    (0..NAME_LEN)
        .map(|_| {
            let idx = rand::thread_rng().gen_range(0..CHARSET.len());
            CHARSET[idx] as char
        })
        .collect()
}

fn count_files(dir: &Path) -> io::Result<usize> {
    let mut count = 0;
    if dir.is_dir() {
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_dir() {
                count += count_files(&path)?;
            } else {
                count += 1;
            }
        }
    }
    Ok(count)
}

fn file_part(name: &str, content: &[u8]) -> Part {
    Part::bytes(content.to_vec()).file_name(name.to_owned())
}

impl FileboxAsyncContext {
    fn client() -> Client {
        Client::builder()
            .cookie_store(true)
            .redirect(Policy::none())
            .build()
            .unwrap()
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    async fn register(&self, client: &Client, email: &str, password: &str) -> StatusCode {
        client
            .post(self.url("/register"))
            .form(&[("email", email), ("password", password)])
            .send()
            .await
            .unwrap()
            .status()
    }

    /// Returns a client holding a session of the given account.
    async fn login_as(&self, email: &str, password: &str) -> Client {
        let client = Self::client();
        let response = client
            .post(self.url("/login"))
            .form(&[("email", email), ("password", password)])
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()[LOCATION], "/dashboard");
        client
    }

    async fn user(&self, email: &str) -> Client {
        let client = Self::client();
        assert_eq!(
            self.register(&client, email, "pw").await,
            StatusCode::SEE_OTHER
        );
        self.login_as(email, "pw").await
    }

    async fn admin(&self) -> Client {
        self.login_as(ADMIN_EMAIL, ADMIN_PASSWORD).await
    }

    async fn upload(&self, client: &Client, form: Form) -> reqwest::Response {
        client
            .post(self.url("/upload"))
            .multipart(form)
            .send()
            .await
            .unwrap()
    }

    async fn upload_one(&self, client: &Client, name: &str, content: &[u8]) -> i64 {
        let form = Form::new().part("files", file_part(name, content));
        let response = self.upload(client, form).await;
        assert_eq!(response.status(), StatusCode::OK);
        let reply: UploadReply = response.json().await.unwrap();
        assert_eq!(reply.ids.len(), 1);
        reply.ids[0]
    }

    async fn files(&self, client: &Client) -> Vec<FileEntry> {
        let response = client.get(self.url("/files")).send().await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        response.json().await.unwrap()
    }

    async fn remove_db(db_path: &Path) {
        for suffix in ["", "-shm", "-wal"] {
            let mut p = db_path.as_os_str().to_owned();
            p.push(suffix);
            tokio::fs::remove_file(p).await.unwrap_or_default();
        }
    }
}

impl AsyncTestContext for FileboxAsyncContext {
    async fn setup() -> FileboxAsyncContext {
        let root = env::temp_dir().join(TEST_ROOT).join(random_name());
        let uploads = root.join("uploads");
        let config = Config {
            db: root.join(random_name() + ".db"),
            uploads_dir: uploads.clone(),
            port: 0,
            admin_email: ADMIN_EMAIL.to_owned(),
            admin_password: ADMIN_PASSWORD.to_owned(),
            max_file_size: MAX_FILE_SIZE,
            ..Config::default()
        };
        let state = AppState::new(config);
        server::prepare(&state).unwrap();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());

        let (send, recv) = oneshot::channel::<()>();
        let app = server::create_routes(state.clone());
        let task = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    recv.await.unwrap_or_default();
                })
                .await
                .unwrap();
        });

        FileboxAsyncContext {
            root,
            uploads,
            state,
            base,
            shutdown: send,
            join: task,
        }
    }

    async fn teardown(self) {
        self.shutdown.send(()).unwrap_or_default();
        self.join.await.unwrap_or_default();
        FileboxAsyncContext::remove_db(&self.state.config.db).await;
        tokio::fs::remove_dir_all(self.root)
            .await
            .unwrap_or_default();
    }
}

#[test_context(FileboxAsyncContext)]
#[tokio::test]
#[serial]
async fn register_duplicate_email_conflicts(ctx: &mut FileboxAsyncContext) {
    // Arrange
    let client = FileboxAsyncContext::client();
    let first = ctx.register(&client, "u1@example.com", "pw1").await;

    // Act
    let second = ctx.register(&client, "u1@example.com", "pw2").await;

    // Assert
    assert_eq!(first, StatusCode::SEE_OTHER);
    assert_eq!(second, StatusCode::CONFLICT);
    ctx.login_as("u1@example.com", "pw1").await;
}

#[test_context(FileboxAsyncContext)]
#[tokio::test]
#[serial]
async fn login_with_wrong_password_is_unauthorized(ctx: &mut FileboxAsyncContext) {
    // Arrange
    let client = FileboxAsyncContext::client();
    ctx.register(&client, "u1@example.com", "pw1").await;

    // Act
    let response = client
        .post(ctx.url("/login"))
        .form(&[("email", "u1@example.com"), ("password", "nope")])
        .send()
        .await
        .unwrap();

    // Assert
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let files = client.get(ctx.url("/files")).send().await.unwrap();
    assert_eq!(files.status(), StatusCode::SEE_OTHER);
}

#[test_context(FileboxAsyncContext)]
#[tokio::test]
#[serial]
async fn anonymous_requests_redirect_to_login(ctx: &mut FileboxAsyncContext) {
    // Arrange
    let client = FileboxAsyncContext::client();

    for path in ["/files", "/dashboard", "/download/1", "/user-info"] {
        // Act
        let response = client.get(ctx.url(path)).send().await.unwrap();

        // Assert
        assert_eq!(response.status(), StatusCode::SEE_OTHER, "{path}");
        assert_eq!(response.headers()[LOCATION], "/login", "{path}");
    }
}

#[test_context(FileboxAsyncContext)]
#[tokio::test]
#[serial]
async fn user_info_reports_role(ctx: &mut FileboxAsyncContext) {
    // Arrange
    let user = ctx.user("u1@example.com").await;
    let admin = ctx.admin().await;

    // Act
    let user_info: UserInfo = user
        .get(ctx.url("/user-info"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let admin_info: UserInfo = admin
        .get(ctx.url("/user-info"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    // Assert
    assert_eq!(user_info.email, "u1@example.com");
    assert_eq!(user_info.role, Role::User);
    assert_eq!(admin_info.role, Role::Admin);
}

#[test_context(FileboxAsyncContext)]
#[tokio::test]
#[serial]
async fn upload_many_creates_record_per_file(ctx: &mut FileboxAsyncContext) {
    // Arrange
    let user = ctx.user("u1@example.com").await;
    let form = Form::new()
        .part("files", file_part("f1", b"f1"))
        .part("files", file_part("f2", b"f2"))
        .part("other", file_part("f3", b"f3"))
        .text("folder", "docs");

    // Act
    let response = ctx.upload(&user, form).await;

    // Assert
    assert_eq!(response.status(), StatusCode::OK);
    let reply: UploadReply = response.json().await.unwrap();
    assert_eq!(reply.ids.len(), 3);
    let files = ctx.files(&user).await;
    assert_eq!(files.len(), 3);
    assert!(files.iter().all(|f| f.folder == "docs"));
    assert_eq!(count_files(&ctx.uploads).unwrap(), 3);
}

#[test_context(FileboxAsyncContext)]
#[tokio::test]
#[serial]
async fn upload_without_folder_uses_default(ctx: &mut FileboxAsyncContext) {
    // Arrange
    let user = ctx.user("u1@example.com").await;

    // Act
    ctx.upload_one(&user, "a.txt", b"a").await;

    // Assert
    let files = ctx.files(&user).await;
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].folder, kernel::DEFAULT_FOLDER);
    assert_eq!(files[0].originalname, "a.txt");
    assert_eq!(files[0].size, 1);
}

#[test_context(FileboxAsyncContext)]
#[tokio::test]
#[serial]
async fn upload_zero_length_file(ctx: &mut FileboxAsyncContext) {
    // Arrange
    let user = ctx.user("u1@example.com").await;

    // Act
    let id = ctx.upload_one(&user, "empty", b"").await;

    // Assert
    let response = user
        .get(ctx.url(&format!("/download/{id}")))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.bytes().await.unwrap().is_empty());
}

#[test_context(FileboxAsyncContext)]
#[tokio::test]
#[serial]
async fn upload_over_size_limit_is_rejected(ctx: &mut FileboxAsyncContext) {
    // Arrange
    let user = ctx.user("u1@example.com").await;
    let big = vec![b'x'; MAX_FILE_SIZE + 1];
    let form = Form::new()
        .part("files", file_part("small", b"ok"))
        .part("files", file_part("big", &big));

    // Act
    let response = ctx.upload(&user, form).await;

    // Assert
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert!(ctx.files(&user).await.is_empty());
    assert_eq!(count_files(&ctx.uploads).unwrap(), 0);
}

#[test_context(FileboxAsyncContext)]
#[tokio::test]
#[serial]
async fn listing_is_scoped_to_owner(ctx: &mut FileboxAsyncContext) {
    // Arrange
    let u1 = ctx.user("u1@example.com").await;
    let u2 = ctx.user("u2@example.com").await;
    ctx.upload_one(&u1, "a.txt", b"a").await;
    ctx.upload_one(&u2, "b.txt", b"b").await;

    // Act
    let u1_files = ctx.files(&u1).await;
    let u2_files = ctx.files(&u2).await;

    // Assert
    assert_eq!(u1_files.len(), 1);
    assert_eq!(u1_files[0].originalname, "a.txt");
    assert_eq!(u2_files.len(), 1);
    assert_eq!(u2_files[0].originalname, "b.txt");
}

#[test_context(FileboxAsyncContext)]
#[tokio::test]
#[serial]
async fn download_own_file(ctx: &mut FileboxAsyncContext) {
    // Arrange
    let user = ctx.user("u1@example.com").await;
    let id = ctx.upload_one(&user, "a.txt", b"hello").await;

    // Act
    let response = user
        .get(ctx.url(&format!("/download/{id}")))
        .send()
        .await
        .unwrap();

    // Assert
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[CONTENT_DISPOSITION],
        r#"attachment; filename="a.txt""#
    );
    assert!(response.headers().contains_key(ETAG));
    assert_eq!(&response.bytes().await.unwrap()[..], b"hello");
}

#[test_context(FileboxAsyncContext)]
#[tokio::test]
#[serial]
async fn download_foreign_file_is_forbidden(ctx: &mut FileboxAsyncContext) {
    // Arrange
    let u1 = ctx.user("u1@example.com").await;
    let u2 = ctx.user("u2@example.com").await;
    let admin = ctx.admin().await;
    let id = ctx.upload_one(&u1, "a.txt", b"a").await;

    // Act
    let foreign = u2
        .get(ctx.url(&format!("/download/{id}")))
        .send()
        .await
        .unwrap();
    let by_admin = admin
        .get(ctx.url(&format!("/download/{id}")))
        .send()
        .await
        .unwrap();

    // Assert
    assert_eq!(foreign.status(), StatusCode::FORBIDDEN);
    assert_eq!(by_admin.status(), StatusCode::OK);
}

#[test_context(FileboxAsyncContext)]
#[tokio::test]
#[serial]
async fn download_unknown_file_is_not_found(ctx: &mut FileboxAsyncContext) {
    // Arrange
    let user = ctx.user("u1@example.com").await;

    // Act
    let response = user.get(ctx.url("/download/4242")).send().await.unwrap();

    // Assert
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[test_context(FileboxAsyncContext)]
#[tokio::test]
#[serial]
async fn user_cannot_delete(ctx: &mut FileboxAsyncContext) {
    // Arrange
    let user = ctx.user("u1@example.com").await;
    let id = ctx.upload_one(&user, "a.txt", b"a").await;

    // Act
    let own = user
        .delete(ctx.url(&format!("/files/{id}")))
        .send()
        .await
        .unwrap();
    let unknown = user.delete(ctx.url("/files/4242")).send().await.unwrap();

    // Assert
    assert_eq!(own.status(), StatusCode::FORBIDDEN);
    assert_eq!(unknown.status(), StatusCode::FORBIDDEN);
    assert_eq!(ctx.files(&user).await.len(), 1);
    assert_eq!(count_files(&ctx.uploads).unwrap(), 1);
}

#[test_context(FileboxAsyncContext)]
#[tokio::test]
#[serial]
async fn admin_delete_removes_record_and_bytes(ctx: &mut FileboxAsyncContext) {
    // Arrange
    let user = ctx.user("u1@example.com").await;
    let admin = ctx.admin().await;
    let id = ctx.upload_one(&user, "a.txt", b"a").await;

    // Act
    let response = admin
        .delete(ctx.url(&format!("/files/{id}")))
        .send()
        .await
        .unwrap();

    // Assert
    assert_eq!(response.status(), StatusCode::OK);
    let _: Message = response.json().await.unwrap();
    assert!(ctx.files(&admin).await.is_empty());
    assert_eq!(count_files(&ctx.uploads).unwrap(), 0);
    let download = user
        .get(ctx.url(&format!("/download/{id}")))
        .send()
        .await
        .unwrap();
    assert_eq!(download.status(), StatusCode::NOT_FOUND);
    let again = admin
        .delete(ctx.url(&format!("/files/{id}")))
        .send()
        .await
        .unwrap();
    assert_eq!(again.status(), StatusCode::NOT_FOUND);
}

#[test_context(FileboxAsyncContext)]
#[tokio::test]
#[serial]
async fn bootstrap_is_idempotent(ctx: &mut FileboxAsyncContext) {
    // Arrange
    let client = FileboxAsyncContext::client();

    // Act
    server::prepare(&ctx.state).unwrap();

    // Assert
    assert_eq!(
        ctx.register(&client, ADMIN_EMAIL, "other").await,
        StatusCode::CONFLICT
    );
    ctx.admin().await;
}

#[test_context(FileboxAsyncContext)]
#[tokio::test]
#[serial]
async fn logout_ends_session(ctx: &mut FileboxAsyncContext) {
    // Arrange
    let user = ctx.user("u1@example.com").await;

    // Act
    let response = user.get(ctx.url("/logout")).send().await.unwrap();

    // Assert
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(response.headers()[LOCATION], "/login");
    let files = user.get(ctx.url("/files")).send().await.unwrap();
    assert_eq!(files.status(), StatusCode::SEE_OTHER);
}

#[test_context(FileboxAsyncContext)]
#[tokio::test]
#[serial]
async fn create_folder_requires_name(ctx: &mut FileboxAsyncContext) {
    // Arrange
    let user = ctx.user("u1@example.com").await;

    // Act
    let named = user
        .post(ctx.url("/create-folder"))
        .json(&serde_json::json!({ "folderName": "docs" }))
        .send()
        .await
        .unwrap();
    let blank = user
        .post(ctx.url("/create-folder"))
        .json(&serde_json::json!({ "folderName": "  " }))
        .send()
        .await
        .unwrap();

    // Assert
    assert_eq!(named.status(), StatusCode::OK);
    assert_eq!(blank.status(), StatusCode::BAD_REQUEST);
}

#[test_context(FileboxAsyncContext)]
#[tokio::test]
#[serial]
async fn unknown_route_is_not_found(ctx: &mut FileboxAsyncContext) {
    // Arrange
    let client = FileboxAsyncContext::client();

    // Act
    let response = client.get(ctx.url("/nowhere")).send().await.unwrap();

    // Assert
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[test_context(FileboxAsyncContext)]
#[tokio::test]
#[serial]
async fn openapi_document_is_served(ctx: &mut FileboxAsyncContext) {
    // Arrange
    let client = FileboxAsyncContext::client();

    // Act
    let response = client
        .get(ctx.url("/api-docs/openapi.json"))
        .send()
        .await
        .unwrap();

    // Assert
    assert_eq!(response.status(), StatusCode::OK);
    let doc: serde_json::Value = response.json().await.unwrap();
    assert!(doc["paths"].get("/upload").is_some());
}

#[test_context(FileboxAsyncContext)]
#[tokio::test]
#[serial]
async fn end_to_end_two_users_and_admin(ctx: &mut FileboxAsyncContext) {
    // Arrange
    let u1 = ctx.user("u1@example.com").await;
    let u2 = ctx.user("u2@example.com").await;
    let admin = ctx.admin().await;
    let a = ctx.upload_one(&u1, "a.txt", b"a").await;
    let b = ctx.upload_one(&u2, "b.txt", b"bb").await;

    // Act
    let everything = ctx.files(&admin).await;
    let deleted = admin
        .delete(ctx.url(&format!("/files/{a}")))
        .send()
        .await
        .unwrap();

    // Assert
    assert_eq!(everything.len(), 2);
    let owners: Vec<_> = everything
        .iter()
        .filter_map(|f| f.user_email.as_deref())
        .collect();
    assert!(owners.contains(&"u1@example.com"));
    assert!(owners.contains(&"u2@example.com"));
    assert_eq!(deleted.status(), StatusCode::OK);
    assert!(ctx.files(&u1).await.is_empty());
    let remaining = ctx.files(&admin).await;
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, b);
}

#[test_context(FileboxAsyncContext)]
#[tokio::test]
#[serial]
async fn upload_same_name_many_times_keeps_every_file(ctx: &mut FileboxAsyncContext) {
    // Arrange
    let user = ctx.user("u1@example.com").await;
    let count = 20;
    let form = (0..count).fold(Form::new(), |form, i| {
        form.part("files", file_part(&format!("dir{i}/a.txt"), b"a"))
    });

    // Act
    let response = ctx.upload(&user, form).await;

    // Assert
    assert_eq!(response.status(), StatusCode::OK);
    let reply: UploadReply = response.json().await.unwrap();
    assert_eq!(reply.ids.len(), count);
    let files = ctx.files(&user).await;
    assert_eq!(files.len(), count);
    assert!(files.iter().all(|f| f.originalname == "a.txt"));
    assert_eq!(count_files(&ctx.uploads).unwrap(), count);
}

#[test_context(FileboxAsyncContext)]
#[tokio::test]
#[serial]
async fn oversized_login_form_is_rejected(ctx: &mut FileboxAsyncContext) {
    // Arrange
    let client = FileboxAsyncContext::client();
    let password = "x".repeat(FORM_LIMIT + 1024);

    // Act
    let response = client
        .post(ctx.url("/login"))
        .form(&[("email", "u1@example.com"), ("password", password.as_str())])
        .send()
        .await
        .unwrap();

    // Assert
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

#[test_context(FileboxAsyncContext)]
#[tokio::test]
#[serial]
async fn end_to_end_docs_upload_visibility(ctx: &mut FileboxAsyncContext) {
    // Arrange
    let client = FileboxAsyncContext::client();
    assert_eq!(
        ctx.register(&client, "u1@example.com", "pw1").await,
        StatusCode::SEE_OTHER
    );
    let u1 = ctx.login_as("u1@example.com", "pw1").await;
    let form = Form::new()
        .text("folder", "docs")
        .part("files", file_part("a.txt", b"hello"));
    let uploaded = ctx.upload(&u1, form).await;
    assert_eq!(uploaded.status(), StatusCode::OK);

    // Act
    let own = ctx.files(&u1).await;
    let u2 = ctx.user("u2@example.com").await;
    let foreign = ctx.files(&u2).await;
    let admin = ctx.admin().await;
    let everything = ctx.files(&admin).await;

    // Assert
    assert_eq!(own.len(), 1);
    assert_eq!(own[0].folder, "docs");
    assert_eq!(own[0].size, 5);
    assert!(foreign.is_empty());
    assert_eq!(everything.len(), 1);
    assert_eq!(everything[0].originalname, "a.txt");
    assert_eq!(everything[0].user_email.as_deref(), Some("u1@example.com"));
}
