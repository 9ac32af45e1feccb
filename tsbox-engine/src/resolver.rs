//! Import resolution for sandboxed modules.
//!
//! The loader serves two internal specifiers from memory: the driver module
//! that invokes the entry point, and the submitted source itself. Anything
//! else is remote: `npm:<package>@<version>` specifiers are rewritten to
//! their registry-CDN URL during resolution (so the package's own relative
//! imports join against an http(s) base), plain URLs are fetched as-is, and
//! both are gated on the call's network-allow flag. Fetched sources land in
//! a process-wide, append-only cache keyed by final URL.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use deno_core::error::ModuleLoaderError;
use deno_core::{
    ModuleLoadResponse, ModuleLoader, ModuleSource, ModuleSourceCode, ModuleSpecifier, ModuleType,
    RequestedModuleType, ResolutionKind,
};
use deno_error::JsErrorBox;

use crate::error::EngineError;

/// Internal specifier for the driver module that calls `main(ctx)`.
pub const DRIVER_SPECIFIER: &str = "tsbox:driver";
/// Internal specifier for the submitted source.
pub const USER_SPECIFIER: &str = "tsbox:user";

const REGISTRY_CDN: &str = "https://esm.sh";

/// Process-wide source cache. Append-only; races on the same specifier are
/// harmless because a specifier+version resolves to stable content.
pub type ModuleCache = Arc<Mutex<HashMap<String, String>>>;

/// Module loader for one sandboxed call.
#[derive(Clone)]
pub struct EsmLoader {
    driver: String,
    user: String,
    allow_net: bool,
    cache: ModuleCache,
    http: reqwest::Client,
}

impl EsmLoader {
    pub fn new(driver: String, user: String, allow_net: bool, cache: ModuleCache) -> Self {
        Self {
            driver,
            user,
            allow_net,
            cache,
            http: reqwest::Client::new(),
        }
    }

    /// Whether a specifier requires leaving the process to resolve.
    fn is_remote(specifier: &str) -> bool {
        specifier.starts_with("npm:")
            || specifier.starts_with("https:")
            || specifier.starts_with("http:")
    }

    /// Final fetch URL for a remote specifier.
    fn registry_url(specifier: &str) -> String {
        match specifier.strip_prefix("npm:") {
            Some(rest) => format!("{REGISTRY_CDN}/{}", rest.trim_start_matches('/')),
            None => specifier.to_string(),
        }
    }

    /// Fetch a remote module source, consulting the cache first. Errors are
    /// returned as the cause only; callers attach the import-failure marker.
    async fn fetch_remote(
        http: &reqwest::Client,
        cache: &ModuleCache,
        specifier: &str,
    ) -> Result<String, String> {
        let url = Self::registry_url(specifier);
        if let Ok(map) = cache.lock() {
            if let Some(hit) = map.get(&url) {
                return Ok(hit.clone());
            }
        }

        tracing::debug!(specifier, url = %url, "fetching remote module");
        let response = http
            .get(&url)
            .send()
            .await
            .map_err(|e| format!("could not fetch \"{specifier}\": {e}"))?;
        if !response.status().is_success() {
            return Err(format!(
                "package \"{specifier}\" could not be fetched (HTTP {})",
                response.status()
            ));
        }
        let body = response
            .text()
            .await
            .map_err(|e| format!("could not read \"{specifier}\": {e}"))?;

        if let Ok(mut map) = cache.lock() {
            map.insert(url, body.clone());
        }
        Ok(body)
    }

    /// Pre-resolve a declared dependency before the entry point runs.
    ///
    /// Local and internal specifiers need no work. Remote specifiers honor
    /// the network gate exactly like imports encountered during loading.
    pub async fn prefetch(&self, specifier: &str) -> Result<(), EngineError> {
        if !Self::is_remote(specifier) {
            return Ok(());
        }
        if !self.allow_net {
            return Err(EngineError::network_disabled(specifier));
        }
        Self::fetch_remote(&self.http, &self.cache, specifier)
            .await
            .map(|_| ())
            .map_err(EngineError::module_import)
    }
}

impl ModuleLoader for EsmLoader {
    fn resolve(
        &self,
        specifier: &str,
        referrer: &str,
        _kind: ResolutionKind,
    ) -> Result<ModuleSpecifier, ModuleLoaderError> {
        // Registry specifiers are rewritten to their CDN URL here, not at
        // load time. An `npm:` URL cannot be a base, so the package's own
        // relative imports would be unresolvable against it; the https URL
        // joins cleanly.
        if specifier.starts_with("npm:") {
            let url = Self::registry_url(specifier);
            return ModuleSpecifier::parse(&url).map_err(|e| {
                ModuleLoaderError::from(JsErrorBox::generic(format!(
                    "Module import failed: cannot resolve \"{specifier}\": {e}"
                )))
            });
        }
        deno_core::resolve_import(specifier, referrer).map_err(|e| {
            ModuleLoaderError::from(JsErrorBox::generic(format!(
                "Module import failed: cannot resolve \"{specifier}\": {e}"
            )))
        })
    }

    fn load(
        &self,
        module_specifier: &ModuleSpecifier,
        _maybe_referrer: Option<&ModuleSpecifier>,
        _is_dyn_import: bool,
        _requested_module_type: RequestedModuleType,
    ) -> ModuleLoadResponse {
        let spec_str = module_specifier.as_str().to_string();
        match module_specifier.scheme() {
            "tsbox" => {
                let source = if spec_str == DRIVER_SPECIFIER {
                    self.driver.clone()
                } else if spec_str == USER_SPECIFIER {
                    self.user.clone()
                } else {
                    return ModuleLoadResponse::Sync(Err(ModuleLoaderError::from(
                        JsErrorBox::generic(format!(
                            "Module import failed: unknown internal module \"{spec_str}\""
                        )),
                    )));
                };
                ModuleLoadResponse::Sync(Ok(ModuleSource::new(
                    ModuleType::JavaScript,
                    ModuleSourceCode::String(source.into()),
                    module_specifier,
                    None,
                )))
            }
            "https" | "http" => {
                if !self.allow_net {
                    return ModuleLoadResponse::Sync(Err(ModuleLoaderError::from(
                        JsErrorBox::generic(
                            EngineError::network_disabled(&spec_str).to_string(),
                        ),
                    )));
                }
                let http = self.http.clone();
                let cache = self.cache.clone();
                let specifier = module_specifier.clone();
                ModuleLoadResponse::Async(Box::pin(async move {
                    let body = Self::fetch_remote(&http, &cache, specifier.as_str())
                        .await
                        .map_err(|detail| {
                            ModuleLoaderError::from(JsErrorBox::generic(format!(
                                "Module import failed: {detail}"
                            )))
                        })?;
                    Ok(ModuleSource::new(
                        ModuleType::JavaScript,
                        ModuleSourceCode::String(body.into()),
                        &specifier,
                        None,
                    ))
                }))
            }
            other => ModuleLoadResponse::Sync(Err(ModuleLoaderError::from(JsErrorBox::generic(
                format!("Module import failed: unsupported module scheme \"{other}\" in \"{spec_str}\""),
            )))),
        }
    }
}
