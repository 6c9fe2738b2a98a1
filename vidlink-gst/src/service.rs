//! RTSP service backed by gst-rtsp-server.

use std::thread::{self, JoinHandle};

use gst::glib;
use gst_rtsp_server::prelude::*;
use gst_rtsp_server::{RTSPMediaFactory, RTSPServer};

use vidlink_core::engine::{ClientCallback, EngineError, Service, ServiceEngine, ServiceMount};

#[derive(Debug, Clone, Copy, Default)]
pub struct GstRtspEngine;

impl ServiceEngine for GstRtspEngine {
    type Service = GstRtspService;

    fn bind_service(
        &mut self,
        mount: ServiceMount<'_>,
        on_client_connected: ClientCallback,
    ) -> Result<GstRtspService, EngineError> {
        let server = RTSPServer::new();
        server.set_service(&mount.port.to_string());

        let mounts = server
            .mount_points()
            .ok_or_else(|| EngineError::Bind("server has no mount points".to_string()))?;
        let factory = RTSPMediaFactory::new();
        factory.set_launch(mount.description.as_str());
        // One capture pipeline for all clients.
        factory.set_shared(true);
        mounts.add_factory(mount.path.as_str(), factory);

        server.connect_client_connected(move |_, _| on_client_connected());

        // Creates the listening socket, so this is where binding fails.
        let source_id = server
            .attach(None)
            .map_err(|err| EngineError::Bind(err.to_string()))?;

        let main_loop = glib::MainLoop::new(None, false);
        let worker = thread::spawn({
            let main_loop = main_loop.clone();
            move || main_loop.run()
        });
        tracing::trace!(port = mount.port, "started rtsp main loop");

        Ok(GstRtspService {
            server,
            source_id,
            main_loop,
            worker,
        })
    }
}

pub struct GstRtspService {
    server: RTSPServer,
    source_id: glib::SourceId,
    main_loop: glib::MainLoop,
    worker: JoinHandle<()>,
}

impl Service for GstRtspService {
    fn shutdown(self) {
        tracing::trace!("stopping rtsp main loop");
        self.main_loop.quit();
        if self.worker.join().is_err() {
            tracing::error!("rtsp main loop panicked");
        }
        self.source_id.remove();
        drop(self.server);
        tracing::trace!("stopped rtsp service");
    }
}
