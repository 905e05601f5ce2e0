//! Carries out classification decisions against the collaborators and keeps
//! the user informed.
//!
//! Every collaborator call is bounded by a timeout; moving attachment bytes
//! gets the longer transfer timeout. A batch is saved as a whole or reported
//! as one failure; nothing is retried.

use std::{future::Future, sync::Arc, time::Duration};

use crate::{
    classifier::{AttachmentSave, ClassificationDecision, RejectReason},
    compose::{escape_html, DocumentDraft},
    domain::{BookmarkRef, ChatId, MessageRef, Recipient},
    errors::Error,
    message::AttachmentHandle,
    messaging::port::MessagingPort,
    ports::{BookmarkService, FileUpload, ImageHost, NewBookmark, PasteService, UsageTracker},
    Result,
};

/// Bookmark URL for attachments whose origin is unknown.
pub const ATTACHMENT_FALLBACK_URL: &str = "https://t.me/";

const STATUS_SAVING: &str = "💾 Saving...";
const FAILURE_TEXT: &str = "❌ Could not save this post. Please try again later.";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SavedItem {
    /// `link`, `attachment` or `document`.
    pub kind: &'static str,
    pub bookmark: BookmarkRef,
    /// URL the bookmark points at.
    pub url: String,
    pub title: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DispatchOutcome {
    Saved(SavedItem),
    Rejected(RejectReason),
}

/// Everything the dispatcher talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub messenger: Arc<dyn MessagingPort>,
    pub bookmarks: Arc<dyn BookmarkService>,
    pub paste: Arc<dyn PasteService>,
    pub images: Arc<dyn ImageHost>,
    pub usage: Arc<dyn UsageTracker>,
}

pub struct Dispatcher {
    deps: Collaborators,
    timeout: Duration,
    transfer_timeout: Duration,
}

impl Dispatcher {
    pub fn new(deps: Collaborators, timeout: Duration) -> Self {
        Self {
            deps,
            timeout,
            transfer_timeout: timeout,
        }
    }

    /// Bound for attachment downloads and file or image uploads. Never shorter
    /// than the regular call timeout.
    pub fn with_transfer_timeout(mut self, transfer_timeout: Duration) -> Self {
        self.transfer_timeout = transfer_timeout.max(self.timeout);
        self
    }

    /// Save according to `decision` and acknowledge the result to the
    /// recipient's chat.
    pub async fn dispatch(
        &self,
        decision: ClassificationDecision,
        recipient: &Recipient,
    ) -> Result<DispatchOutcome> {
        let chat_id = recipient.chat_id;

        if let ClassificationDecision::Reject(reason) = decision {
            tracing::info!(user_id = recipient.user_id.0, %reason, "post rejected");
            self.acknowledge(chat_id, None, &escape_html(&reason.user_hint()))
                .await;
            return Ok(DispatchOutcome::Rejected(reason));
        }

        let status = match self
            .call("status message", self.deps.messenger.send_html(chat_id, STATUS_SAVING))
            .await
        {
            Ok(m) => Some(m),
            Err(e) => {
                tracing::warn!(error = %e, "failed to send status message");
                None
            }
        };

        match self.save(decision, recipient).await {
            Ok(outcome) => {
                if let DispatchOutcome::Saved(item) = &outcome {
                    self.acknowledge(chat_id, status, &success_html(item)).await;
                    self.track_usage(recipient, item.kind).await;
                }
                Ok(outcome)
            }
            Err(e) => {
                tracing::warn!(user_id = recipient.user_id.0, error = %e, "save failed");
                self.acknowledge(chat_id, status, FAILURE_TEXT).await;
                Err(e)
            }
        }
    }

    /// Perform the collaborator calls for `decision` without talking to the
    /// user.
    pub async fn save(
        &self,
        decision: ClassificationDecision,
        recipient: &Recipient,
    ) -> Result<DispatchOutcome> {
        let item = match decision {
            ClassificationDecision::Reject(reason) => {
                return Ok(DispatchOutcome::Rejected(reason));
            }
            ClassificationDecision::SaveLink { url } => self.save_link(url, recipient).await?,
            ClassificationDecision::SaveAttachment(att) => {
                self.save_attachment(att, recipient).await?
            }
            ClassificationDecision::SaveDocument(draft) => {
                self.save_document(draft, recipient).await?
            }
        };

        tracing::info!(
            user_id = recipient.user_id.0,
            kind = item.kind,
            bookmark = item.bookmark.0,
            "saved"
        );
        Ok(DispatchOutcome::Saved(item))
    }

    async fn save_link(&self, url: String, recipient: &Recipient) -> Result<SavedItem> {
        let bookmark = self
            .call(
                "bookmark create",
                self.deps
                    .bookmarks
                    .create_bookmark(&recipient.account, NewBookmark::parsed(url.clone())),
            )
            .await?;

        Ok(SavedItem {
            kind: "link",
            bookmark,
            url,
            title: None,
        })
    }

    async fn save_attachment(&self, att: AttachmentSave, recipient: &Recipient) -> Result<SavedItem> {
        let url = att
            .source_url
            .clone()
            .unwrap_or_else(|| ATTACHMENT_FALLBACK_URL.to_string());

        let bookmark = self
            .call(
                "bookmark create",
                self.deps.bookmarks.create_bookmark(
                    &recipient.account,
                    NewBookmark::titled(url.clone(), att.title.clone()),
                ),
            )
            .await?;

        let bytes = self.fetch(&att.handle).await?;
        self.transfer(
            "bookmark file upload",
            self.deps.bookmarks.upload_file(
                &recipient.account,
                bookmark,
                FileUpload {
                    bytes,
                    name: att.name.clone(),
                    mime: att.mime.clone(),
                },
            ),
        )
        .await?;

        Ok(SavedItem {
            kind: "attachment",
            bookmark,
            url,
            title: Some(att.name),
        })
    }

    async fn save_document(&self, draft: DocumentDraft, recipient: &Recipient) -> Result<SavedItem> {
        let mut image_urls = Vec::new();
        for image in draft.images() {
            let bytes = self.fetch(&image.handle).await?;
            let urls = self
                .transfer(
                    "image upload",
                    self.deps.images.upload_image(FileUpload {
                        bytes,
                        name: image.name.clone(),
                        mime: image.mime.clone(),
                    }),
                )
                .await?;
            let url = urls.into_iter().next().ok_or_else(|| {
                Error::Collaborator(format!("image host returned no url for {}", image.name))
            })?;
            image_urls.push(url);
        }

        let html = draft.render(&image_urls)?;
        let paste_url = self
            .call("html upload", self.deps.paste.upload_html(&html))
            .await?;

        let mut bookmark = NewBookmark::titled(paste_url.clone(), draft.title.clone());
        if !draft.excerpt.trim().is_empty() {
            bookmark = bookmark.with_description(draft.excerpt.clone());
        }
        let bookmark = self
            .call(
                "bookmark create",
                self.deps
                    .bookmarks
                    .create_bookmark(&recipient.account, bookmark),
            )
            .await?;

        Ok(SavedItem {
            kind: "document",
            bookmark,
            url: paste_url,
            title: Some(draft.title),
        })
    }

    async fn fetch(&self, handle: &AttachmentHandle) -> Result<Vec<u8>> {
        self.transfer(
            "attachment download",
            self.deps.messenger.fetch_attachment(handle),
        )
        .await
    }

    async fn call<T>(&self, what: &'static str, fut: impl Future<Output = Result<T>>) -> Result<T> {
        within(what, self.timeout, fut).await
    }

    async fn transfer<T>(&self, what: &'static str, fut: impl Future<Output = Result<T>>) -> Result<T> {
        within(what, self.transfer_timeout, fut).await
    }

    /// Edit the status message into `html`, or send it fresh when there is no
    /// status message or the edit fails.
    async fn acknowledge(&self, chat_id: ChatId, status: Option<MessageRef>, html: &str) {
        if let Some(msg) = status {
            match self
                .call("status edit", self.deps.messenger.edit_html(msg, html))
                .await
            {
                Ok(()) => return,
                Err(e) => tracing::warn!(error = %e, "failed to edit status message"),
            }
        }
        if let Err(e) = self
            .call("reply", self.deps.messenger.send_html(chat_id, html))
            .await
        {
            tracing::warn!(chat_id = chat_id.0, error = %e, "failed to acknowledge");
        }
    }

    async fn track_usage(&self, recipient: &Recipient, kind: &str) {
        if let Err(e) = self
            .call(
                "usage tracking",
                self.deps.usage.record_usage(recipient.user_id, kind),
            )
            .await
        {
            tracing::warn!(user_id = recipient.user_id.0, error = %e, "usage tracking failed");
        }
    }
}

async fn within<T>(
    what: &'static str,
    after: Duration,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(after, fut).await {
        Ok(result) => result,
        Err(_) => Err(Error::Timeout { what, after }),
    }
}

fn success_html(item: &SavedItem) -> String {
    match item.kind {
        "document" => format!(
            r#"✅ Saved to Raindrop.io as <a href="{}">{}</a>"#,
            escape_html(&item.url),
            escape_html(item.title.as_deref().unwrap_or("a page"))
        ),
        "attachment" => format!(
            "✅ Saved <b>{}</b> to Raindrop.io",
            escape_html(item.title.as_deref().unwrap_or("attachment"))
        ),
        _ => "✅ Saved to Raindrop.io".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashMap,
        sync::{
            atomic::{AtomicI64, Ordering},
            Mutex,
        },
    };

    use async_trait::async_trait;

    use super::*;
    use crate::{
        classifier::{Classifier, TransportPath},
        ports::{Bookmark, BookmarkQuery},
        domain::{BookmarkAccount, MessageId, UserId},
        message::{Attachment, AttachmentKind, ForwardSource, InboundMessage},
    };

    #[derive(Default)]
    struct FakeMessenger {
        next_id: Mutex<i32>,
        sends: Mutex<Vec<String>>,
        edits: Mutex<Vec<(MessageRef, String)>>,
        files: HashMap<String, Vec<u8>>,
        fail_status: bool,
        fetch_delay: Duration,
    }

    impl FakeMessenger {
        fn with_files(files: &[(&str, &[u8])]) -> Self {
            Self {
                files: files
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_vec()))
                    .collect(),
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl MessagingPort for FakeMessenger {
        async fn send_html(&self, chat_id: ChatId, html: &str) -> Result<MessageRef> {
            if self.fail_status && html == STATUS_SAVING {
                return Err(Error::Collaborator("send failed".into()));
            }
            self.sends.lock().unwrap().push(html.to_string());
            let mut id = self.next_id.lock().unwrap();
            *id += 1;
            Ok(MessageRef {
                chat_id,
                message_id: MessageId(*id),
            })
        }

        async fn edit_html(&self, msg: MessageRef, html: &str) -> Result<()> {
            self.edits.lock().unwrap().push((msg, html.to_string()));
            Ok(())
        }

        async fn fetch_attachment(&self, handle: &AttachmentHandle) -> Result<Vec<u8>> {
            tokio::time::sleep(self.fetch_delay).await;
            self.files
                .get(&handle.0)
                .cloned()
                .ok_or_else(|| Error::Collaborator(format!("no file {}", handle.0)))
        }
    }

    #[derive(Debug, PartialEq, Eq)]
    enum BookmarkCall {
        Create(NewBookmark),
        Upload(BookmarkRef, String, Vec<u8>),
    }

    #[derive(Default)]
    struct FakeBookmarks {
        next_id: AtomicI64,
        calls: Mutex<Vec<BookmarkCall>>,
        hang: bool,
    }

    #[async_trait]
    impl BookmarkService for FakeBookmarks {
        async fn create_bookmark(
            &self,
            account: &BookmarkAccount,
            bookmark: NewBookmark,
        ) -> Result<BookmarkRef> {
            assert_eq!(account.api_token, "tok");
            if self.hang {
                std::future::pending::<()>().await;
            }
            self.calls.lock().unwrap().push(BookmarkCall::Create(bookmark));
            Ok(BookmarkRef(100 + self.next_id.fetch_add(1, Ordering::SeqCst)))
        }

        async fn upload_file(
            &self,
            _account: &BookmarkAccount,
            bookmark: BookmarkRef,
            file: FileUpload,
        ) -> Result<()> {
            self.calls
                .lock()
                .unwrap()
                .push(BookmarkCall::Upload(bookmark, file.name, file.bytes));
            Ok(())
        }

        async fn search(
            &self,
            _account: &BookmarkAccount,
            _query: BookmarkQuery,
        ) -> Result<Vec<Bookmark>> {
            Ok(Vec::new())
        }
    }

    #[derive(Default)]
    struct FakePaste {
        pages: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl PasteService for FakePaste {
        async fn upload_html(&self, html: &str) -> Result<String> {
            let mut pages = self.pages.lock().unwrap();
            pages.push(html.to_string());
            Ok(format!("https://paste.test/html/{}", pages.len()))
        }
    }

    #[derive(Default)]
    struct FakeImages {
        uploads: Mutex<Vec<String>>,
        empty: bool,
    }

    #[async_trait]
    impl ImageHost for FakeImages {
        async fn upload_image(&self, image: FileUpload) -> Result<Vec<String>> {
            if self.empty {
                return Ok(Vec::new());
            }
            let mut uploads = self.uploads.lock().unwrap();
            uploads.push(image.name);
            Ok(vec![format!("https://img.test/{}", uploads.len())])
        }
    }

    #[derive(Default)]
    struct FakeUsage {
        records: Mutex<Vec<(UserId, String)>>,
        fail: bool,
    }

    #[async_trait]
    impl UsageTracker for FakeUsage {
        async fn record_usage(&self, user_id: UserId, kind: &str) -> Result<()> {
            if self.fail {
                return Err(Error::Collaborator("disk full".into()));
            }
            self.records.lock().unwrap().push((user_id, kind.to_string()));
            Ok(())
        }
    }

    struct Harness {
        messenger: Arc<FakeMessenger>,
        bookmarks: Arc<FakeBookmarks>,
        paste: Arc<FakePaste>,
        images: Arc<FakeImages>,
        usage: Arc<FakeUsage>,
    }

    impl Harness {
        fn new(messenger: FakeMessenger) -> Self {
            Self {
                messenger: Arc::new(messenger),
                bookmarks: Arc::default(),
                paste: Arc::default(),
                images: Arc::default(),
                usage: Arc::default(),
            }
        }

        fn dispatcher(&self) -> Dispatcher {
            Dispatcher::new(
                Collaborators {
                    messenger: self.messenger.clone(),
                    bookmarks: self.bookmarks.clone(),
                    paste: self.paste.clone(),
                    images: self.images.clone(),
                    usage: self.usage.clone(),
                },
                Duration::from_secs(15),
            )
        }
    }

    fn recipient() -> Recipient {
        Recipient {
            user_id: UserId(1),
            chat_id: ChatId(10),
            account: BookmarkAccount {
                api_token: "tok".into(),
            },
        }
    }

    fn photo(id: i32) -> InboundMessage {
        InboundMessage::media(
            id,
            10,
            Attachment {
                kind: AttachmentKind::Photo,
                handle: AttachmentHandle(format!("file-{id}")),
                size: 3,
                mime: None,
                file_name: None,
            },
            None,
        )
        .forwarded_from(Some(ForwardSource {
            name: "chan".into(),
            url: Some("https://t.me/chan".into()),
        }))
    }

    #[tokio::test]
    async fn link_is_saved_with_metadata_parsing() {
        let h = Harness::new(FakeMessenger::default());
        let decision = ClassificationDecision::SaveLink {
            url: "https://x.test/a".into(),
        };

        let outcome = h.dispatcher().dispatch(decision, &recipient()).await.unwrap();

        assert!(matches!(outcome, DispatchOutcome::Saved(ref item) if item.kind == "link"));
        assert_eq!(
            *h.bookmarks.calls.lock().unwrap(),
            vec![BookmarkCall::Create(NewBookmark::parsed("https://x.test/a"))]
        );
        assert_eq!(*h.messenger.sends.lock().unwrap(), vec![STATUS_SAVING]);
        let edits = h.messenger.edits.lock().unwrap();
        assert_eq!(edits.len(), 1);
        assert!(edits[0].1.starts_with("✅"));
        assert_eq!(
            *h.usage.records.lock().unwrap(),
            vec![(UserId(1), "link".to_string())]
        );
    }

    #[tokio::test]
    async fn attachment_creates_placeholder_then_uploads_bytes() {
        let h = Harness::new(FakeMessenger::with_files(&[("file-1", b"PDF")]));
        let decision = ClassificationDecision::SaveAttachment(AttachmentSave {
            handle: AttachmentHandle("file-1".into()),
            name: "paper.pdf".into(),
            mime: "application/pdf".into(),
            size: 3,
            title: "A paper".into(),
            source_url: None,
        });

        h.dispatcher().dispatch(decision, &recipient()).await.unwrap();

        let calls = h.bookmarks.calls.lock().unwrap();
        assert_eq!(
            *calls,
            vec![
                BookmarkCall::Create(NewBookmark::titled(ATTACHMENT_FALLBACK_URL, "A paper")),
                BookmarkCall::Upload(BookmarkRef(100), "paper.pdf".into(), b"PDF".to_vec()),
            ]
        );
    }

    #[tokio::test]
    async fn failed_download_is_one_failure() {
        let h = Harness::new(FakeMessenger::default());
        let decision = ClassificationDecision::SaveAttachment(AttachmentSave {
            handle: AttachmentHandle("missing".into()),
            name: "a.bin".into(),
            mime: "application/octet-stream".into(),
            size: 1,
            title: "a.bin".into(),
            source_url: Some("https://t.me/chan/5".into()),
        });

        let err = h.dispatcher().dispatch(decision, &recipient()).await.unwrap_err();

        assert!(matches!(err, Error::Collaborator(_)));
        let edits = h.messenger.edits.lock().unwrap();
        assert_eq!(edits.last().map(|e| e.1.as_str()), Some(FAILURE_TEXT));
        assert!(h.usage.records.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn photo_batch_becomes_a_page_with_uploaded_images() {
        let h = Harness::new(FakeMessenger::with_files(&[
            ("file-1", b"a"),
            ("file-2", b"b"),
            ("file-3", b"c"),
        ]));
        let batch: Vec<_> = (1..=3).map(photo).collect();
        let decision = Classifier::new(TransportPath::BotApi).classify_batch(&batch);

        let outcome = h.dispatcher().dispatch(decision, &recipient()).await.unwrap();

        assert_eq!(h.images.uploads.lock().unwrap().len(), 3);
        let pages = h.paste.pages.lock().unwrap();
        assert_eq!(pages.len(), 1);
        for i in 1..=3 {
            assert!(pages[0].contains(&format!("https://img.test/{i}")));
        }

        let calls = h.bookmarks.calls.lock().unwrap();
        let [BookmarkCall::Create(bookmark)] = calls.as_slice() else {
            panic!("expected one bookmark create, got {calls:?}");
        };
        assert_eq!(bookmark.url, "https://paste.test/html/1");
        assert!(!bookmark.parse_metadata);
        assert_eq!(
            bookmark.title.as_deref(),
            Some(crate::compose::FALLBACK_TITLE)
        );

        let DispatchOutcome::Saved(item) = outcome else {
            panic!("expected saved");
        };
        assert_eq!(item.kind, "document");
        assert_eq!(item.url, "https://paste.test/html/1");
    }

    #[tokio::test]
    async fn image_host_without_urls_fails_before_paste() {
        let mut h = Harness::new(FakeMessenger::with_files(&[("file-1", b"a"), ("file-2", b"b")]));
        h.images = Arc::new(FakeImages {
            empty: true,
            ..Default::default()
        });
        let batch: Vec<_> = (1..=2).map(photo).collect();
        let decision = Classifier::default().classify_batch(&batch);

        let err = h.dispatcher().dispatch(decision, &recipient()).await.unwrap_err();

        assert!(matches!(err, Error::Collaborator(_)));
        assert!(h.paste.pages.lock().unwrap().is_empty());
        assert!(h.bookmarks.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn rejection_only_sends_a_hint() {
        let h = Harness::new(FakeMessenger::default());
        let decision = ClassificationDecision::Reject(RejectReason::TooShort);

        let outcome = h.dispatcher().dispatch(decision, &recipient()).await.unwrap();

        assert_eq!(outcome, DispatchOutcome::Rejected(RejectReason::TooShort));
        let sends = h.messenger.sends.lock().unwrap();
        assert_eq!(sends.len(), 1);
        assert!(sends[0].contains("too short"));
        assert!(h.bookmarks.calls.lock().unwrap().is_empty());
        assert!(h.usage.records.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_collaborator_times_out() {
        let mut h = Harness::new(FakeMessenger::default());
        h.bookmarks = Arc::new(FakeBookmarks {
            hang: true,
            ..Default::default()
        });
        let decision = ClassificationDecision::SaveLink {
            url: "https://x.test".into(),
        };

        let err = h.dispatcher().dispatch(decision, &recipient()).await.unwrap_err();

        assert!(matches!(
            err,
            Error::Timeout {
                what: "bookmark create",
                ..
            }
        ));
        let edits = h.messenger.edits.lock().unwrap();
        assert_eq!(edits.last().map(|e| e.1.as_str()), Some(FAILURE_TEXT));
    }

    fn slow_attachment() -> ClassificationDecision {
        ClassificationDecision::SaveAttachment(AttachmentSave {
            handle: AttachmentHandle("file-1".into()),
            name: "talk.mp4".into(),
            mime: "video/mp4".into(),
            size: 90 * 1024 * 1024,
            title: "talk.mp4".into(),
            source_url: None,
        })
    }

    #[tokio::test(start_paused = true)]
    async fn large_download_gets_the_transfer_timeout() {
        let h = Harness::new(FakeMessenger {
            fetch_delay: Duration::from_secs(30),
            ..FakeMessenger::with_files(&[("file-1", b"video")])
        });
        let dispatcher = h
            .dispatcher()
            .with_transfer_timeout(Duration::from_secs(120));

        let outcome = dispatcher.dispatch(slow_attachment(), &recipient()).await;

        assert!(matches!(outcome, Ok(DispatchOutcome::Saved(_))));
        assert_eq!(h.bookmarks.calls.lock().unwrap().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn download_past_the_transfer_timeout_fails() {
        let h = Harness::new(FakeMessenger {
            fetch_delay: Duration::from_secs(30),
            ..FakeMessenger::with_files(&[("file-1", b"video")])
        });
        let dispatcher = h.dispatcher().with_transfer_timeout(Duration::from_secs(20));

        let err = dispatcher
            .dispatch(slow_attachment(), &recipient())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            Error::Timeout {
                what: "attachment download",
                after,
            } if after == Duration::from_secs(20)
        ));
    }

    #[tokio::test]
    async fn result_is_sent_fresh_when_status_message_failed() {
        let h = Harness::new(FakeMessenger {
            fail_status: true,
            ..Default::default()
        });
        let decision = ClassificationDecision::SaveLink {
            url: "https://x.test".into(),
        };

        h.dispatcher().dispatch(decision, &recipient()).await.unwrap();

        assert!(h.messenger.edits.lock().unwrap().is_empty());
        let sends = h.messenger.sends.lock().unwrap();
        assert_eq!(sends.len(), 1);
        assert!(sends[0].starts_with("✅"));
    }

    #[tokio::test]
    async fn usage_failure_does_not_fail_the_save() {
        let mut h = Harness::new(FakeMessenger::default());
        h.usage = Arc::new(FakeUsage {
            fail: true,
            ..Default::default()
        });
        let decision = ClassificationDecision::SaveLink {
            url: "https://x.test".into(),
        };

        let outcome = h.dispatcher().dispatch(decision, &recipient()).await;
        assert!(matches!(outcome, Ok(DispatchOutcome::Saved(_))));
    }
}
