use axum::{http::StatusCode, response::Html};

const LOGIN: &str = r#"<!doctype html>
<html><head><meta charset="utf-8"><title>filebox - login</title></head>
<body>
<h1>Login</h1>
<form method="post" action="/login">
  <input type="email" name="email" placeholder="email" required>
  <input type="password" name="password" placeholder="password" required>
  <button type="submit">Login</button>
</form>
<p><a href="/register">Create an account</a></p>
</body></html>"#;

const REGISTER: &str = r#"<!doctype html>
<html><head><meta charset="utf-8"><title>filebox - register</title></head>
<body>
<h1>Register</h1>
<form method="post" action="/register">
  <input type="email" name="email" placeholder="email" required>
  <input type="password" name="password" placeholder="password" required>
  <button type="submit">Register</button>
</form>
<p><a href="/login">Back to login</a></p>
</body></html>"#;

const DASHBOARD: &str = r#"<!doctype html>
<html><head><meta charset="utf-8"><title>filebox</title></head>
<body>
<h1>My files</h1>
<p>Signed in as <span id="user-email"></span> | <a href="/logout">Logout</a></p>
<input type="file" id="file-input" multiple>
<input type="text" id="folder-name" placeholder="folder">
<button onclick="uploadFiles()">Upload</button>
<div id="upload-status"></div>
<div id="files-list"></div>
<script>
function esc(s) { const d = document.createElement('div'); d.textContent = s; return d.innerHTML; }
function loadFiles() {
  fetch('/files').then(r => r.json()).then(files => {
    const list = document.getElementById('files-list');
    list.innerHTML = files.length === 0 ? '<p>No files yet.</p>' : '';
    files.forEach(f => {
      const item = document.createElement('div');
      item.innerHTML = `<strong>${esc(f.originalname)}</strong> (${f.size} bytes) folder: ${esc(f.folder)} `
        + `<a href="/download/${f.id}">download</a>`;
      list.appendChild(item);
    });
  });
}
function uploadFiles() {
  const input = document.getElementById('file-input');
  const status = document.getElementById('upload-status');
  if (input.files.length === 0) { status.textContent = 'Select files first.'; return; }
  const form = new FormData();
  for (const f of input.files) form.append('files', f);
  form.append('folder', document.getElementById('folder-name').value);
  fetch('/upload', { method: 'POST', body: form }).then(r => r.json()).then(d => {
    status.textContent = d.message || d.error; input.value = ''; loadFiles();
  });
}
fetch('/user-info').then(r => r.json()).then(u => { document.getElementById('user-email').textContent = u.email; });
loadFiles();
</script>
</body></html>"#;

const ADMIN: &str = r#"<!doctype html>
<html><head><meta charset="utf-8"><title>filebox - admin</title></head>
<body>
<h1>All files</h1>
<p>Signed in as <span id="user-email"></span> | <a href="/logout">Logout</a></p>
<div id="all-files-list"></div>
<script>
function esc(s) { const d = document.createElement('div'); d.textContent = s; return d.innerHTML; }
function loadAllFiles() {
  fetch('/files').then(r => r.json()).then(files => {
    const list = document.getElementById('all-files-list');
    list.innerHTML = files.length === 0 ? '<p>No files uploaded yet.</p>' : '';
    files.forEach(f => {
      const item = document.createElement('div');
      item.innerHTML = `<strong>${esc(f.originalname)}</strong> (${f.size} bytes) user: ${esc(f.user_email)} `
        + `folder: ${esc(f.folder)} <a href="/download/${f.id}">download</a> `
        + `<button onclick="deleteFile(${f.id})">delete</button>`;
      list.appendChild(item);
    });
  });
}
function deleteFile(id) {
  if (!confirm('Delete this file?')) return;
  fetch(`/files/${id}`, { method: 'DELETE' }).then(r => r.json()).then(d => {
    alert(d.message || d.error); loadAllFiles();
  });
}
fetch('/user-info').then(r => r.json()).then(u => { document.getElementById('user-email').textContent = u.email; });
loadAllFiles();
</script>
</body></html>"#;

#[must_use]
pub fn login() -> Html<&'static str> {
    Html(LOGIN)
}

#[must_use]
pub fn register() -> Html<&'static str> {
    Html(REGISTER)
}

#[must_use]
pub fn dashboard(admin: bool) -> Html<&'static str> {
    if admin {
        Html(ADMIN)
    } else {
        Html(DASHBOARD)
    }
}

/// Page shown when a form submission fails, linking back to the form.
#[must_use]
pub fn failure(status: StatusCode, message: &str, back: &str) -> (StatusCode, Html<String>) {
    let message = escape(message);
    (
        status,
        Html(format!(
            r#"<!doctype html>
<html><head><meta charset="utf-8"><title>filebox</title></head>
<body><p role="alert">{message}</p><p><a href="{back}">Try again</a></p></body></html>"#
        )),
    )
}

fn escape(s: &str) -> String {
    s.chars().fold(String::with_capacity(s.len()), |mut out, c| {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
        out
    })
}
