//! Browser fingerprint collection.
//!
//! First contact on the redirect path gets a short-lived HTML page instead
//! of a redirect. Its inline script gathers lightweight identity signals
//! and immediately re-POSTs the same URL with `{ js_meta, is_client: true }`;
//! the two phases are correlated only by the identical URL and whatever the
//! cookie jar carries forward. The full-fingerprint variant below is used
//! by the localization endpoint, not the redirect path.

/// Renders the challenge document. `locale` only feeds the `lang`
/// attribute; the page is intentionally blank to the eye.
pub fn render_challenge(locale: &str) -> String {
    let lang = if locale.is_empty() { "en" } else { locale };
    format!(
        r#"<!doctype html>
<html lang="{lang}">
<head>
<meta charset="utf-8">
<meta name="robots" content="noindex">
<title>&#8203;</title>
</head>
<body>
<script>
(function () {{
  var meta = {{
    js_language: navigator.language || "",
    js_languages: (navigator.languages || []).join(","),
    js_referrer: document.referrer || "",
    js_platform: navigator.platform || "",
    js_timezone: "",
    js_locale: "",
    js_calendar: "",
    js_screen: screen.width + "x" + screen.height
  }};
  try {{
    var resolved = Intl.DateTimeFormat().resolvedOptions();
    meta.js_timezone = resolved.timeZone || "";
    meta.js_locale = resolved.locale || "";
    meta.js_calendar = resolved.calendar || "";
  }} catch (e) {{}}
  fetch(window.location.href, {{
    method: "POST",
    credentials: "include",
    headers: {{ "Content-Type": "application/json" }},
    body: JSON.stringify({{ js_meta: meta, is_client: true }})
  }})
    .then(function (response) {{ return response.json(); }})
    .then(function (data) {{
      if (data && data.url) {{ window.location.replace(data.url); }}
    }})
    .catch(function () {{}});
}})();
</script>
</body>
</html>
"#
    )
}

/// Full fingerprint collector injected into article pages by the
/// presentation layer. Collects the async, higher-entropy signals and posts
/// them once per page load to `/api/localization`. The guard keeps repeat
/// executions (hydration, HMR, double injection) from re-submitting.
pub const LOCALIZATION_SCRIPT: &str = r##"(function () {
  if (window.__localizationProcessed) { return; }
  window.__localizationProcessed = true;
  var startedAt = Date.now();

  function canvasHash() {
    try {
      var canvas = document.createElement("canvas");
      canvas.width = 200;
      canvas.height = 40;
      var ctx = canvas.getContext("2d");
      ctx.textBaseline = "top";
      ctx.font = "14px Arial";
      ctx.fillStyle = "#f60";
      ctx.fillRect(80, 1, 60, 20);
      ctx.fillStyle = "#069";
      ctx.fillText("clickgate,<canvas> 1.0", 2, 15);
      var data = canvas.toDataURL();
      var hash = 0;
      for (var i = 0; i < data.length; i++) {
        hash = ((hash << 5) - hash + data.charCodeAt(i)) | 0;
      }
      return String(hash);
    } catch (e) { return ""; }
  }

  function webglInfo() {
    try {
      var canvas = document.createElement("canvas");
      var gl = canvas.getContext("webgl") || canvas.getContext("experimental-webgl");
      if (!gl) { return { vendor: "", renderer: "", extensions: "" }; }
      var info = gl.getExtension("WEBGL_debug_renderer_info");
      var extensions = (gl.getSupportedExtensions() || []).join(",");
      var hash = 0;
      for (var i = 0; i < extensions.length; i++) {
        hash = ((hash << 5) - hash + extensions.charCodeAt(i)) | 0;
      }
      return {
        vendor: info ? gl.getParameter(info.UNMASKED_VENDOR_WEBGL) : "",
        renderer: info ? gl.getParameter(info.UNMASKED_RENDERER_WEBGL) : "",
        extensions: String(hash)
      };
    } catch (e) { return { vendor: "", renderer: "", extensions: "" }; }
  }

  function audioSampleRate() {
    try {
      var Ctx = window.AudioContext || window.webkitAudioContext;
      if (!Ctx) { return 0; }
      var ctx = new Ctx();
      var rate = ctx.sampleRate;
      if (ctx.close) { ctx.close(); }
      return rate;
    } catch (e) { return 0; }
  }

  function mediaDevices() {
    if (!navigator.mediaDevices || !navigator.mediaDevices.enumerateDevices) {
      return Promise.resolve("");
    }
    return navigator.mediaDevices.enumerateDevices().then(function (devices) {
      return devices.map(function (d) { return d.kind; }).join(",");
    }).catch(function () { return ""; });
  }

  function clientHints() {
    if (!navigator.userAgentData || !navigator.userAgentData.getHighEntropyValues) {
      return Promise.resolve({});
    }
    return navigator.userAgentData.getHighEntropyValues([
      "architecture", "bitness", "model", "platformVersion", "fullVersionList"
    ]).catch(function () { return {}; });
  }

  function speechVoices() {
    try {
      if (!window.speechSynthesis) { return ""; }
      return (window.speechSynthesis.getVoices() || [])
        .map(function (v) { return v.name; }).join(",");
    } catch (e) { return ""; }
  }

  function permissionStates() {
    if (!navigator.permissions || !navigator.permissions.query) {
      return Promise.resolve("");
    }
    var names = ["geolocation", "notifications", "camera", "microphone", "clipboard-read"];
    return Promise.all(names.map(function (name) {
      return navigator.permissions.query({ name: name })
        .then(function (status) { return name + ":" + status.state; })
        .catch(function () { return name + ":unsupported"; });
    })).then(function (states) { return states.join(","); });
  }

  var gl = webglInfo();
  var meta = {
    js_language: navigator.language || "",
    js_languages: (navigator.languages || []).join(","),
    js_referrer: document.referrer || "",
    js_canvas: canvasHash(),
    js_webgl_vendor: gl.vendor,
    js_webgl_renderer: gl.renderer,
    js_webgl_extensions: gl.extensions,
    js_audio_sample_rate: audioSampleRate(),
    js_speech_voices: speechVoices()
  };

  Promise.all([mediaDevices(), clientHints(), permissionStates()])
    .then(function (results) {
      meta.js_media_devices = results[0];
      var hints = results[1];
      for (var key in hints) {
        if (Object.prototype.hasOwnProperty.call(hints, key)) {
          meta["js_ua_" + key] = typeof hints[key] === "string"
            ? hints[key]
            : JSON.stringify(hints[key]);
        }
      }
      meta.js_permissions = results[2];
      return fetch("/api/localization", {
        method: "POST",
        credentials: "include",
        headers: { "Content-Type": "application/json" },
        body: JSON.stringify({
          url: window.location.href,
          localization_meta: meta,
          execution_time_ms: Date.now() - startedAt
        })
      });
    })
    .catch(function () {});
})();
"##;
