use std::io::{BufRead, BufReader, BufWriter, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::mpsc::SyncSender;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use strip_driver::Pixel;

use crate::effects::{Cycle, Effect, Fade, KnightRider, Rainbow, Zip};
use crate::renderer::Shared;

const OFF_FADE: Duration = Duration::from_secs(20);

/// Line-oriented TCP command front end. Each connection gets its own
/// thread; effects go to the renderer through the single-slot channel,
/// status queries read the renderer's published snapshot.
pub struct Server {
    listener: TcpListener,
    tx: SyncSender<Effect>,
    shared: Shared,
    num_pixels: usize,
    num_colors: usize,
    max_per_channel: i32,
}

/// Split off the first space-separated token.
fn split_first(s: &str) -> (&str, &str) {
    match s.split_once(' ') {
        Some((tok, rest)) => (tok, rest),
        None => (s, ""),
    }
}

/// Durations on the wire are decimal seconds: "2.5" is 2.5s, "0.1" 100ms.
fn parse_duration(parms: &str) -> Result<(&str, Duration)> {
    let (tok, rest) = split_first(parms);
    let secs: f64 = tok
        .parse()
        .with_context(|| format!("couldn't parse duration '{}'", tok))?;
    let d = Duration::try_from_secs_f64(secs)
        .map_err(|_| anyhow!("invalid duration '{}'", tok))?;
    Ok((rest, d))
}

/// Colors are hex byte pairs, one per configured channel, each bounded by
/// what the strip can carry.
fn parse_color(parms: &str, num_colors: usize, max: i32) -> Result<(&str, Pixel)> {
    let (tok, rest) = split_first(parms);
    if !tok.is_ascii() || tok.len() != num_colors * 2 {
        bail!("wanted {} hex pairs, got '{}'", num_colors, tok);
    }
    let mut chans = [-1i32; 4];
    for (i, chan) in chans.iter_mut().take(num_colors).enumerate() {
        *chan = i32::from_str_radix(&tok[i * 2..i * 2 + 2], 16)
            .with_context(|| format!("bad hex in '{}'", tok))?;
    }
    let p = Pixel { r: chans[0], g: chans[1], b: chans[2], w: chans[3] };
    if p.r > max || p.g > max || p.b > max || p.w > max {
        bail!(
            "invalid color: one or more of {}, {}, {}, {} is >{}, parsed from '{}'",
            p.r, p.g, p.b, p.w, max, tok
        );
    }
    Ok((rest, p))
}

impl Server {
    pub fn new(
        port: u16,
        tx: SyncSender<Effect>,
        shared: Shared,
        num_pixels: usize,
        num_colors: usize,
        max_per_channel: i32,
    ) -> Result<Self> {
        let listener = TcpListener::bind(("0.0.0.0", port))
            .with_context(|| format!("couldn't listen on port {}", port))?;
        log::info!("listening on port {}", port);
        Ok(Server { listener, tx, shared, num_pixels, num_colors, max_per_channel })
    }

    pub fn run(self: Arc<Self>) -> ! {
        loop {
            match self.listener.accept() {
                Ok((conn, addr)) => {
                    let srv = Arc::clone(&self);
                    thread::spawn(move || {
                        if let Err(e) = srv.handle_connection(conn, addr) {
                            log::error!("connection {}: {:#}", addr, e);
                        }
                    });
                }
                Err(e) => log::error!("error accepting connection: {}", e),
            }
        }
    }

    fn handle_connection(&self, conn: TcpStream, addr: SocketAddr) -> Result<()> {
        log::info!("handling connection from {}", addr);
        let mut reader = BufReader::new(conn.try_clone().context("couldn't clone socket")?);
        let mut writer = BufWriter::new(conn);
        let mut line = String::new();
        loop {
            line.clear();
            if reader.read_line(&mut line).context("read failed")? == 0 {
                log::info!("EOF for connection {}", addr);
                return Ok(());
            }
            let l = line.trim();
            log::debug!("got line '{}'", l);
            let (cmd, parms) = split_first(l);
            let cmd = cmd.to_uppercase();
            if cmd == "QUIT" {
                return Ok(());
            }
            if let Err(e) = self.dispatch(&cmd, parms, &mut writer) {
                let es = format!("error handling command: {:#}", e);
                log::error!("{}", es);
                writer.write_all(format!("ERR: {}\n", es).as_bytes())?;
                writer.flush().context("error writing error reply")?;
                return Ok(());
            }
        }
    }

    fn dispatch(&self, cmd: &str, parms: &str, w: &mut BufWriter<TcpStream>) -> Result<()> {
        match cmd {
            "FADE_ALL" => {
                let (parms, p) = parse_color(parms, self.num_colors, self.max_per_channel)?;
                let (_, d) = parse_duration(parms)?;
                self.send_effect(Effect::Fade(Fade::new(d, p)), w)
            }
            "ZIP_SET_ALL" => {
                let (parms, p) = parse_color(parms, self.num_colors, self.max_per_channel)?;
                let (_, d) = parse_duration(parms)?;
                self.send_effect(Effect::Zip(Zip::new(d, p)), w)
            }
            "CYCLE" => {
                let (_, d) = parse_duration(parms)?;
                self.send_effect(Effect::Cycle(Cycle::new(d)), w)
            }
            "RAINBOW" => {
                let (_, d) = parse_duration(parms)?;
                self.send_effect(Effect::Rainbow(Rainbow::new(d)), w)
            }
            "KNIGHTRIDER" => {
                let (_, d) = parse_duration(parms)?;
                self.send_effect(
                    Effect::KnightRider(KnightRider::new(d, self.num_pixels / 4)),
                    w,
                )
            }
            "GET" => {
                let lit = {
                    let st = self.shared.lock().unwrap();
                    st.pixels.iter().any(|p| p.r != 0 || p.g != 0 || p.b != 0)
                };
                reply(w, if lit { "1\n" } else { "0\n" })
            }
            "COLOUR" | "COLOR" => {
                let p = {
                    let st = self.shared.lock().unwrap();
                    st.pixels.first().copied().unwrap_or(Pixel::black(self.num_colors))
                };
                let c = format!("{}\n", p);
                log::debug!("returning {}", c.trim());
                reply(w, &c)
            }
            "MODE" => {
                let name = {
                    let st = self.shared.lock().unwrap();
                    if st.off {
                        "OFF".to_string()
                    } else if st.running {
                        match &st.last_effect {
                            Some(e) => e.name().to_string(),
                            None => bail!("running, but no last effect"),
                        }
                    } else {
                        "CONST".to_string()
                    }
                };
                log::debug!("mode '{}'", name);
                if parms.is_empty() {
                    reply(w, &format!("{}\n", name))
                } else {
                    reply(w, if parms == name { "1\n" } else { "0\n" })
                }
            }
            "ON" => {
                let last = self.shared.lock().unwrap().last_effect.clone();
                match last {
                    Some(e) => self.send_effect(e, w),
                    None => bail!("no previous effect"),
                }
            }
            "OFF" => {
                // Fade out without replacing the remembered effect, so ON
                // can bring it back.
                let fade = Effect::Fade(Fade::new(OFF_FADE, Pixel::black(self.num_colors)));
                self.shared.lock().unwrap().off = true;
                reply(w, "OK\n")?;
                self.tx.send(fade).map_err(|_| anyhow!("renderer is gone"))?;
                Ok(())
            }
            _ => bail!("unknown command: {}", cmd),
        }
    }

    fn send_effect(&self, e: Effect, w: &mut BufWriter<TcpStream>) -> Result<()> {
        reply(w, "OK\n")?;
        self.tx.send(e.clone()).map_err(|_| anyhow!("renderer is gone"))?;
        let mut st = self.shared.lock().unwrap();
        st.last_effect = Some(e);
        st.off = false;
        Ok(())
    }
}

fn reply(w: &mut BufWriter<TcpStream>, s: &str) -> Result<()> {
    w.write_all(s.as_bytes())?;
    w.flush().context("error writing reply")?;
    Ok(())
}
