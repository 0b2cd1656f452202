use super::{BuildMessage, BuildOptions, BuildStream, Engine};
use anyhow::{Context, Result};
use bollard::image::{BuildImageOptions, TagImageOptions};
use bollard::models::BuildInfo;
use bollard::Docker;
use bytes::{Buf, Bytes};
use futures_util::stream::{Stream, StreamExt};
use std::fs;
use std::io::{self, Read};
use std::path::Path;
use std::pin::Pin;
use tokio::runtime::Handle;

/// Docker daemon engine over the local socket.
///
/// Calls are blocking: each async daemon call or stream item is driven to
/// completion on the given runtime handle, one at a time.
pub struct DockerEngine {
    docker: Docker,
    handle: Handle,
}

impl DockerEngine {
    /// Prepares a client for the local daemon without contacting it yet.
    pub fn new(handle: Handle) -> Result<Self> {
        let docker = {
            let _guard = handle.enter();
            Docker::connect_with_local_defaults()
                .context("Failed to create Docker client. Is DOCKER_HOST valid?")?
        };

        Ok(Self { docker, handle })
    }

    /// Contacts the daemon and settles on a mutually supported API version.
    pub fn connect(self) -> Result<Self> {
        let docker = self
            .handle
            .block_on(self.docker.negotiate_version())
            .context("Failed to reach the Docker daemon. Is Docker running?")?;

        Ok(Self {
            docker,
            handle: self.handle,
        })
    }
}

impl Engine for DockerEngine {
    fn name(&self) -> &str {
        "docker"
    }

    fn build(&self, context: &Path, options: &BuildOptions) -> Result<BuildStream<'_>> {
        let body = fs::read(context)
            .with_context(|| format!("Failed to read build context: {}", context.display()))?;

        let request = BuildImageOptions {
            dockerfile: options.dockerfile.clone(),
            t: options.tags.first().cloned().unwrap_or_default(),
            nocache: options.no_cache,
            cachefrom: options.cache_from.clone(),
            pull: options.pull,
            rm: options.remove,
            forcerm: options.force_rm,
            memory: options.memory,
            cpushares: options.cpu_shares,
            buildargs: options.build_args.clone(),
            labels: options.labels.clone(),
            ..Default::default()
        };

        let stream = self
            .docker
            .build_image(request, None, Some(Bytes::from(body)));
        let messages = BlockingStream::new(&self.handle, stream).map(|item| {
            item.map(BuildMessage::from)
                .map_err(|e| anyhow::Error::new(e).context("Docker build request failed"))
        });

        Ok(Box::new(messages))
    }

    fn tag(&self, image_id: &str, reference: &str) -> Result<()> {
        let (repo, tag) = split_reference(reference);
        let options = TagImageOptions {
            repo: repo.to_string(),
            tag: tag.to_string(),
        };

        self.handle
            .block_on(self.docker.tag_image(image_id, Some(options)))
            .with_context(|| format!("Failed to tag image {} as {}", image_id, reference))
    }

    fn save(&self, image_id: &str) -> Result<Box<dyn Read + '_>> {
        let stream = self.docker.export_image(image_id);
        Ok(Box::new(BlockingReader {
            chunks: BlockingStream::new(&self.handle, stream),
            current: Bytes::new(),
        }))
    }
}

impl From<BuildInfo> for BuildMessage {
    fn from(info: BuildInfo) -> Self {
        BuildMessage {
            stream: info.stream,
            status: info.status,
            error: info
                .error
                .or_else(|| info.error_detail.and_then(|detail| detail.message)),
            aux_id: info.aux.and_then(|aux| aux.id),
        }
    }
}

/// Splits `repo[:tag]` into its parts; the tag defaults to `latest`.
///
/// A colon before the last `/` belongs to a registry port, not a tag.
pub fn split_reference(reference: &str) -> (&str, &str) {
    let name_start = reference.rfind('/').map_or(0, |i| i + 1);
    match reference[name_start..].rfind(':') {
        Some(i) => {
            let split = name_start + i;
            (&reference[..split], &reference[split + 1..])
        }
        None => (reference, "latest"),
    }
}

/// Iterator over an async stream, pulling one item per `next`.
struct BlockingStream<'a, T> {
    handle: &'a Handle,
    inner: Pin<Box<dyn Stream<Item = Result<T, bollard::errors::Error>> + 'a>>,
}

impl<'a, T> BlockingStream<'a, T> {
    fn new<S>(handle: &'a Handle, stream: S) -> Self
    where
        S: Stream<Item = Result<T, bollard::errors::Error>> + 'a,
    {
        Self {
            handle,
            inner: Box::pin(stream),
        }
    }
}

impl<T> Iterator for BlockingStream<'_, T> {
    type Item = Result<T, bollard::errors::Error>;

    fn next(&mut self) -> Option<Self::Item> {
        self.handle.block_on(self.inner.next())
    }
}

/// `Read` adapter over a stream of byte chunks.
struct BlockingReader<'a> {
    chunks: BlockingStream<'a, Bytes>,
    current: Bytes,
}

impl Read for BlockingReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        while !self.current.has_remaining() {
            match self.chunks.next() {
                Some(Ok(chunk)) => self.current = chunk,
                Some(Err(e)) => return Err(io::Error::new(io::ErrorKind::Other, e)),
                None => return Ok(0),
            }
        }

        let n = buf.len().min(self.current.len());
        buf[..n].copy_from_slice(&self.current[..n]);
        self.current.advance(n);
        Ok(n)
    }
}
