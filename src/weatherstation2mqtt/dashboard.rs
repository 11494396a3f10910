// weatherstation2mqtt - Bridge Weather Underground style station uploads to MQTT
//
// Copyright 2022 Nick Pillitteri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.
//

use crate::config::Configuration;
use crate::state::WAITING;

/// Render the dashboard page: live data, the settings form, and the restart control.
///
/// Live data is not rendered here, the page polls `/api/live` every two seconds.
pub fn render(cfg: &Configuration) -> String {
    let (enabled, disabled) = if cfg.discovery_enabled {
        ("selected", "")
    } else {
        ("", "selected")
    };

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8">
<meta name="viewport" content="width=device-width, initial-scale=1.0">
<title>Weather Station Bridge</title>
<style>
body {{ font-family: system-ui, sans-serif; background: #f0f2f5; color: #333; margin: 0; padding: 20px; }}
.container {{ max-width: 900px; margin: 0 auto; }}
.card {{ background: #fff; padding: 25px; border-radius: 12px; box-shadow: 0 4px 6px rgba(0,0,0,0.05); margin-bottom: 25px; }}
.card.offline {{ opacity: 0.7; }}
.card-header {{ display: flex; justify-content: space-between; align-items: center; padding-bottom: 10px; border-bottom: 2px solid #2980b9; }}
.sub-header {{ display: flex; justify-content: space-between; font-size: 0.85em; color: #7f8c8d; margin: 10px 0 20px; }}
#live-badge {{ width: 8px; height: 8px; background: #ccc; border-radius: 50%; display: inline-block; }}
.online #live-badge {{ background: #2ecc71; }}
.offline #live-badge {{ background: #e74c3c; }}
.grid {{ display: grid; grid-template-columns: repeat(auto-fill, minmax(150px, 1fr)); gap: 15px; }}
.stat-box {{ background: #ecf0f1; padding: 15px; border-radius: 8px; text-align: center; }}
.stat-value {{ font-size: 1.4em; font-weight: 700; color: #2980b9; }}
.stat-label {{ font-size: 0.9em; color: #7f8c8d; margin-top: 5px; }}
form {{ display: flex; flex-direction: column; gap: 15px; }}
input, select {{ padding: 10px; border: 1px solid #ddd; border-radius: 6px; width: 100%; box-sizing: border-box; }}
.row {{ display: flex; gap: 15px; }}
.btn {{ padding: 12px; border: none; border-radius: 6px; cursor: pointer; color: #fff; font-weight: 600; width: 100%; }}
.btn-save {{ background: #27ae60; }}
.btn-restart {{ background: #c0392b; }}
</style>
</head>
<body>
<div class="container">
  <div class="card" id="data-card">
    <div class="card-header"><h2>Live Weather Data</h2></div>
    <div class="sub-header">
      <div>Live API Connected: <span id="live-badge"></span></div>
      <div id="timestamp">{waiting}</div>
    </div>
    <div class="grid" id="data-grid"></div>
  </div>

  <div class="card">
    <div class="card-header"><h2>Configuration</h2></div>
    <form action="/save" method="POST">
      <label>MQTT Broker</label>
      <input type="text" name="mqtt_broker" value="{broker}" required>
      <div class="row">
        <div style="flex: 1;"><label>Port</label><input type="number" name="mqtt_port" value="{port}"></div>
        <div style="flex: 2;"><label>Topic</label><input type="text" name="mqtt_topic" value="{topic}"></div>
      </div>
      <label>MQTT User / Pass (Optional)</label>
      <div class="row">
        <input type="text" name="mqtt_user" value="{user}" placeholder="Username">
        <input type="password" name="mqtt_pass" value="{pass}" placeholder="Password">
      </div>
      <label>Device Name (Home Assistant)</label>
      <input type="text" name="device_name" value="{device}">
      <label>Auto-Discovery</label>
      <select name="discovery_enabled">
        <option value="true" {enabled}>Enabled</option>
        <option value="false" {disabled}>Disabled</option>
      </select>
      <button type="submit" class="btn btn-save">Save Settings</button>
    </form>
  </div>

  <div class="card">
    <h3>System Control</h3>
    <p>Restart stops the service. It only comes back if it runs under a supervisor such as systemd or Docker.</p>
    <form action="/restart" method="POST">
      <button type="submit" class="btn btn-restart">Restart Service</button>
    </form>
  </div>
</div>
<script>
function escapeHtml(s) {{
  const d = document.createElement('div');
  d.innerText = s;
  return d.innerHTML;
}}

function updateData() {{
  const card = document.getElementById('data-card');
  fetch('/api/live')
    .then(res => {{
      if (!res.ok) throw new Error(res.statusText);
      return res.json();
    }})
    .then(data => {{
      card.classList.add('online');
      card.classList.remove('offline');
      document.getElementById('timestamp').innerText = 'Last Update: ' + data.timestamp;
      const grid = document.getElementById('data-grid');
      const keys = Object.keys(data.values).sort();
      if (keys.length === 0) {{
        grid.innerHTML = '<div style="grid-column:1/-1; text-align:center; color:#999;">Waiting for weather station...</div>';
        return;
      }}
      grid.innerHTML = keys.map(k =>
        '<div class="stat-box"><div class="stat-value">' + escapeHtml(data.values[k]) +
        '</div><div class="stat-label">' + escapeHtml(k) + '</div></div>').join('');
    }})
    .catch(() => {{
      card.classList.remove('online');
      card.classList.add('offline');
      document.getElementById('timestamp').innerText = 'Connection Lost (Retrying...)';
    }});
}}

updateData();
setInterval(updateData, 2000);
</script>
</body>
</html>
"#,
        waiting = WAITING,
        broker = escape(&cfg.broker_host),
        port = cfg.broker_port,
        topic = escape(&cfg.topic),
        user = escape(&cfg.user),
        pass = escape(&cfg.pass),
        device = escape(&cfg.device_name),
        enabled = enabled,
        disabled = disabled,
    )
}

/// Escape characters that are special in HTML text and attribute values.
fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

#[cfg(test)]
mod tests {
    use super::{escape, render};
    use crate::config::Configuration;

    #[test]
    fn test_escape() {
        assert_eq!("a &amp; b &lt;c&gt; &quot;d&quot; &#39;e&#39;", escape(r#"a & b <c> "d" 'e'"#));
    }

    #[test]
    fn test_render_includes_settings() {
        let cfg = Configuration {
            broker_host: "mqtt.example.com".to_owned(),
            broker_port: 8883,
            device_name: r#"Yard "North""#.to_owned(),
            discovery_enabled: false,
            ..Default::default()
        };

        let html = render(&cfg);
        assert!(html.contains(r#"name="mqtt_broker" value="mqtt.example.com""#));
        assert!(html.contains(r#"name="mqtt_port" value="8883""#));
        assert!(html.contains(r#"value="Yard &quot;North&quot;""#));
        assert!(html.contains(r#"<option value="false" selected>"#));
        assert!(html.contains(r#"<option value="true" >"#));
    }
}
