//! The mount controller: owns the motors, the plate solver and the
//! alignment state, runs the periodic loops and serves the coarse verbs
//! the protocol surface translates client commands into.

pub mod responder;

use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use tokio::sync::{Notify, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::alignment::AlignmentHandler;
use crate::astro_math::modulo;
use crate::camera::{create_plate_solver, PlateSolver};
use crate::config::Config;
use crate::coords::{
    altaz_at_different_time, altaz_from_radec, radec_from_altaz, radec_from_lx200, AltAz,
    Pointing, RaDec,
};
use crate::enums::{Axis, ControllerMode, MotorState, SlewDirection, SlewRate};
use crate::environment::Environment;
use crate::errors::{MountError, Result};
use crate::motor::{create_motor, MotorController};

/// Position loop interval [sec].
pub const POSITION_INTERVAL: f64 = 0.5;

/// The two motors of a motorized mount. Always both or neither.
#[derive(Clone)]
pub struct MotorPair {
    pub alt: Arc<MotorController>,
    pub az: Arc<MotorController>,
}

#[derive(Debug)]
struct ControlState {
    mode: ControllerMode,
    slew_rate: SlewRate,
    slew_direction: SlewDirection,
    is_slewing: bool,
    motor_alt_az: Pointing,
    camera_alt_az: Pointing,
    previous_camera_alt_az: Pointing,
    camera_alignment: AlignmentHandler,
    motor_alignment: AlignmentHandler,
}

impl ControlState {
    fn new(mode: ControllerMode, timestamp: f64) -> Self {
        let origin = Pointing::new(AltAz::default(), timestamp);
        ControlState {
            mode,
            slew_rate: SlewRate::High,
            slew_direction: SlewDirection::None,
            is_slewing: false,
            motor_alt_az: origin,
            camera_alt_az: origin,
            previous_camera_alt_az: origin,
            camera_alignment: AlignmentHandler::new(),
            motor_alignment: AlignmentHandler::new(),
        }
    }

    /// The alignment handler the current mode and slew state select.
    fn active_alignment(&self) -> Option<&AlignmentHandler> {
        match self.mode {
            ControllerMode::CameraOnly => Some(&self.camera_alignment),
            ControllerMode::MotorsOnly => Some(&self.motor_alignment),
            ControllerMode::CameraAndMotors => {
                if self.is_slewing {
                    Some(&self.camera_alignment)
                } else {
                    Some(&self.motor_alignment)
                }
            }
            ControllerMode::None => None,
        }
    }
}

pub struct MountController {
    env: Environment,
    state: Arc<RwLock<ControlState>>,
    motors: RwLock<Option<MotorPair>>,
    plate_solver: RwLock<Option<Arc<dyn PlateSolver>>>,
    position_task: StdMutex<Option<JoinHandle<()>>>,
    plate_solve_task: StdMutex<Option<JoinHandle<()>>>,
    /// Fires once per position-loop tick, after the motor pointing has been
    /// published. Observers and tests hook in here.
    position_event: Arc<Notify>,
}

impl MountController {
    /// Build the controller for the configured backends. A backend that
    /// fails to build is logged and left out; the mode reflects what
    /// remains.
    pub fn new(config: &Config, env: Environment) -> Self {
        let motors = match (&config.alt, &config.az) {
            (Some(alt_settings), Some(az_settings)) => {
                let built = create_motor(alt_settings, Axis::Alt, env.clock().clone()).and_then(
                    |alt| {
                        create_motor(az_settings, Axis::Az, env.clock().clone()).map(|az| {
                            MotorPair {
                                alt: Arc::new(alt),
                                az: Arc::new(az),
                            }
                        })
                    },
                );
                match built {
                    Ok(pair) => Some(pair),
                    Err(e) => {
                        warn!("Failed to load the configured motors, continuing without: {e}");
                        None
                    }
                }
            }
            _ => {
                warn!("No motors configured.");
                None
            }
        };

        let plate_solver = config.camera.as_ref().and_then(|settings| {
            match create_plate_solver(settings) {
                Ok(solver) => Some(solver),
                Err(e) => {
                    warn!("Failed to load the configured camera, continuing without: {e}");
                    None
                }
            }
        });

        let mode = match (motors.is_some(), plate_solver.is_some()) {
            (true, true) => ControllerMode::CameraAndMotors,
            (true, false) => ControllerMode::MotorsOnly,
            (false, true) => ControllerMode::CameraOnly,
            (false, false) => ControllerMode::None,
        };

        Self::from_parts(motors, plate_solver, mode, env)
    }

    pub(crate) fn from_parts(
        motors: Option<MotorPair>,
        plate_solver: Option<Arc<dyn PlateSolver>>,
        mode: ControllerMode,
        env: Environment,
    ) -> Self {
        let state = ControlState::new(mode, env.now());
        MountController {
            env,
            state: Arc::new(RwLock::new(state)),
            motors: RwLock::new(motors),
            plate_solver: RwLock::new(plate_solver),
            position_task: StdMutex::new(None),
            plate_solve_task: StdMutex::new(None),
            position_event: Arc::new(Notify::new()),
        }
    }

    pub async fn mode(&self) -> ControllerMode {
        self.state.read().await.mode
    }

    pub async fn is_slewing(&self) -> bool {
        self.state.read().await.is_slewing
    }

    pub async fn slew_rate(&self) -> SlewRate {
        self.state.read().await.slew_rate
    }

    pub async fn slew_direction(&self) -> SlewDirection {
        self.state.read().await.slew_direction
    }

    pub async fn motor_alt_az(&self) -> Pointing {
        self.state.read().await.motor_alt_az
    }

    pub async fn camera_alt_az(&self) -> Pointing {
        self.state.read().await.camera_alt_az
    }

    pub async fn motor_alignment_matrix(&self) -> nalgebra::Matrix3<f64> {
        self.state.read().await.motor_alignment.matrix()
    }

    pub async fn camera_alignment_matrix(&self) -> nalgebra::Matrix3<f64> {
        self.state.read().await.camera_alignment.matrix()
    }

    pub fn position_events(&self) -> Arc<Notify> {
        Arc::clone(&self.position_event)
    }

    /// Attach the motors, start the periodic loops and the plate solver.
    pub async fn start(&self) {
        info!("Start called.");
        self.attach_motors().await;
        self.start_plate_solver().await;
        info!(mode = ?self.mode().await, "Mount controller started.");
    }

    /// Cancel the loops, stop the camera and detach the motors.
    pub async fn stop(&self) {
        info!("Stop called.");
        self.stop_plate_solver().await;
        self.detach_motors().await;
        info!("Stopped.");
    }

    async fn attach_motors(&self) {
        let pair = self.motors.read().await.clone();
        let Some(pair) = pair else {
            return;
        };

        let attached = async {
            pair.alt.connect().await?;
            pair.az.connect().await
        }
        .await;
        if let Err(e) = attached {
            warn!("Failed to attach the motors, continuing without: {e}");
            let _ = pair.alt.disconnect().await;
            let _ = pair.az.disconnect().await;
            *self.motors.write().await = None;
            let mut state = self.state.write().await;
            state.mode = state.mode.without_motors();
            return;
        }

        let handle = tokio::spawn(Self::position_loop(
            self.env.clone(),
            Arc::clone(&self.state),
            pair,
            Arc::clone(&self.position_event),
        ));
        *self.position_task.lock().unwrap() = Some(handle);
    }

    async fn detach_motors(&self) {
        let handle = self.position_task.lock().unwrap().take();
        if let Some(handle) = handle {
            handle.abort();
            let _ = handle.await;
        }
        if let Some(pair) = self.motors.read().await.clone() {
            if let Err(e) = pair.alt.disconnect().await {
                warn!("Error detaching the altitude motor: {e}");
            }
            if let Err(e) = pair.az.disconnect().await {
                warn!("Error detaching the azimuth motor: {e}");
            }
        }
    }

    async fn start_plate_solver(&self) {
        let solver = self.plate_solver.read().await.clone();
        let Some(solver) = solver else {
            return;
        };

        debug!("Starting plate solver.");
        let prepared = async {
            solver.open_camera().await?;
            solver.start_imaging().await
        }
        .await;
        if let Err(e) = prepared {
            warn!("Error starting the configured camera, continuing without: {e}");
            *self.plate_solver.write().await = None;
            let mut state = self.state.write().await;
            state.mode = state.mode.without_camera();
            return;
        }

        let motors = self.motors.read().await.clone();
        let handle = tokio::spawn(Self::plate_solve_loop(
            self.env.clone(),
            Arc::clone(&self.state),
            solver,
            motors,
        ));
        *self.plate_solve_task.lock().unwrap() = Some(handle);
        debug!("Plate solver started.");
    }

    async fn stop_plate_solver(&self) {
        let handle = self.plate_solve_task.lock().unwrap().take();
        if let Some(handle) = handle {
            handle.abort();
            let _ = handle.await;
        }
        if let Some(solver) = self.plate_solver.read().await.clone() {
            if let Err(e) = solver.stop_imaging().await {
                warn!("Error stopping the camera: {e}");
            }
        }
    }

    /// Sample the motors every [`POSITION_INTERVAL`] seconds with a
    /// non-drifting cadence and keep the axes on the sidereal track.
    async fn position_loop(
        env: Environment,
        state: Arc<RwLock<ControlState>>,
        motors: MotorPair,
        position_event: Arc<Notify>,
    ) {
        let start_time = env.now();
        debug!(start_time, "Position loop started.");
        loop {
            let alt_az = AltAz::new(motors.alt.position(), motors.az.position());

            motors.az.update_tracking_state();
            motors.alt.update_tracking_state();
            let is_slewing = motors.az.state() == MotorState::Slewing
                || motors.alt.state() == MotorState::Slewing;
            let both_tracking = motors.az.state() == MotorState::Tracking
                && motors.alt.state() == MotorState::Tracking;

            {
                let mut state = state.write().await;
                state.motor_alt_az = Pointing::new(alt_az, env.now());
                state.is_slewing = is_slewing;
            }
            position_event.notify_waiters();

            // The slew targets the AltAz at the end of the longest axis
            // slew, so tracking may only start once both motors have come
            // to rest. The track point lies one interval past the next
            // tick, giving the loop a lookahead that keeps the motors from
            // reversing through backlash.
            if both_tracking {
                let timediff = 2.0 * POSITION_INTERVAL;
                let now = env.now();
                let location = env.location();
                let current = AltAz::new(motors.alt.position(), motors.az.position());
                let target = altaz_at_different_time(current, &location, now, timediff);
                if let Err(e) = motors.az.track(target.az, timediff).await {
                    warn!("Azimuth tracking command failed: {e}");
                }
                if let Err(e) = motors.alt.track(target.alt, timediff).await {
                    warn!("Altitude tracking command failed: {e}");
                }
            }

            let remainder = modulo(env.now() - start_time, POSITION_INTERVAL);
            tokio::time::sleep(Duration::from_secs_f64(POSITION_INTERVAL - remainder)).await;
        }
    }

    /// Solve as fast as the solver allows and keep the camera pointing
    /// fresh. In `CameraAndMotors` mode every solve also pins the motor
    /// positions to the absolute sky reference.
    async fn plate_solve_loop(
        env: Environment,
        state: Arc<RwLock<ControlState>>,
        solver: Arc<dyn PlateSolver>,
        motors: Option<MotorPair>,
    ) {
        debug!("Plate solve loop started.");
        loop {
            let now = env.now();
            match solver.solve().await {
                Ok(camera_ra_dec) => {
                    let alt_az = altaz_from_radec(camera_ra_dec, &env.location(), now);
                    let mut state = state.write().await;
                    state.previous_camera_alt_az = state.camera_alt_az;
                    state.camera_alt_az = Pointing::new(alt_az, now);
                    if state.mode == ControllerMode::CameraAndMotors {
                        if let Some(motors) = &motors {
                            motors.az.set_position(alt_az.az);
                            motors.alt.set_position(alt_az.alt);
                        }
                    }
                    debug!(?camera_ra_dec, ?alt_az, "Plate solve completed.");
                }
                Err(e) => {
                    // Keep the previously solved position.
                    debug!("Plate solve failed: {e}");
                }
            }
            debug!(elapsed = env.now() - now, "Plate solve cycle done.");
        }
    }

    /// The current equatorial pointing of the mount, fused from the source
    /// the mode and slew state select.
    pub async fn get_ra_dec(&self) -> RaDec {
        let (mount_alt_az, sky_alt_az) = {
            let state = self.state.read().await;
            let (mount_alt_az, handler) = match state.mode {
                ControllerMode::CameraOnly => {
                    (state.camera_alt_az, Some(&state.camera_alignment))
                }
                ControllerMode::MotorsOnly => (state.motor_alt_az, Some(&state.motor_alignment)),
                ControllerMode::CameraAndMotors => {
                    if state.is_slewing {
                        (state.motor_alt_az, Some(&state.camera_alignment))
                    } else {
                        (state.camera_alt_az, Some(&state.motor_alignment))
                    }
                }
                ControllerMode::None => (
                    Pointing::new(AltAz::default(), self.env.now()),
                    None,
                ),
            };
            let sky_alt_az = match handler {
                Some(handler) => handler.sky_from_telescope(mount_alt_az.alt_az),
                None => mount_alt_az.alt_az,
            };
            (mount_alt_az, sky_alt_az)
        };
        radec_from_altaz(sky_alt_az, &self.env.location(), mount_alt_az.timestamp)
    }

    /// Sync: adopt the given equatorial position as where the mount points
    /// right now, recording an alignment pair for every capable handler.
    pub async fn set_ra_dec(&self, ra_dec: RaDec) {
        let now = self.env.now();
        let location = self.env.location();
        let sky_alt_az = altaz_from_radec(ra_dec, &location, now);

        let motors = self.motors.read().await.clone();
        let mut state = self.state.write().await;
        if state.mode.has_camera() {
            let camera_alt_az = state.camera_alt_az.alt_az;
            state
                .camera_alignment
                .add_alignment_point(sky_alt_az, camera_alt_az);
            debug!(?sky_alt_az, ?camera_alt_az, "New camera alignment point.");
        }
        if state.mode.has_motors() {
            if let Some(motors) = &motors {
                let mount_alt_az = AltAz::new(motors.alt.position(), motors.az.position());
                state
                    .motor_alignment
                    .add_alignment_point(sky_alt_az, mount_alt_az);
                debug!(?sky_alt_az, ?mount_alt_az, "New motor alignment point.");
            }
        }
    }

    /// Set the slew rate from the LX200 rate command.
    pub async fn set_slew_rate(&self, cmd: &str) -> Result<()> {
        let rate = SlewRate::from_command(cmd)?;
        self.state.write().await.slew_rate = rate;
        Ok(())
    }

    /// Slew to the target parsed from the LX200 strings. Returns `"0"` when
    /// the slew was started and `"1"` when the target stays below the
    /// horizon.
    pub async fn slew_to(&self, ra_str: &str, dec_str: &str) -> Result<String> {
        let motors = self.motors.read().await.clone().ok_or_else(|| {
            MountError::hardware("the mount has no motors to slew with")
        })?;

        let now = self.env.now();
        let location = self.env.location();
        let ra_dec = radec_from_lx200(ra_str, dec_str)?;
        let alt_az = altaz_from_radec(ra_dec, &location, now);

        let mount_alt_az = {
            let state = self.state.read().await;
            match state.active_alignment() {
                Some(handler) => handler.telescope_from_sky(alt_az),
                None => alt_az,
            }
        };

        // The mount keeps moving while we slew, so aim for where the target
        // will be when the longest axis gets there.
        let az_slew_time = motors.az.estimate_slew_time(mount_alt_az.az);
        let alt_slew_time = motors.alt.estimate_slew_time(mount_alt_az.alt);
        let slew_time = az_slew_time.max(alt_slew_time);

        let alt_az_after_slew = altaz_from_radec(ra_dec, &location, now + slew_time);
        let mount_alt_az_after_slew = {
            let state = self.state.read().await;
            match state.active_alignment() {
                Some(handler) => handler.telescope_from_sky(alt_az_after_slew),
                None => alt_az_after_slew,
            }
        };

        self.state.write().await.slew_direction = SlewDirection::None;
        if mount_alt_az_after_slew.alt > 0.0 {
            self.state.write().await.slew_rate = SlewRate::High;
            motors
                .az
                .move_to(mount_alt_az_after_slew.az, SlewRate::High)
                .await?;
            motors
                .alt
                .move_to(mount_alt_az_after_slew.alt, SlewRate::High)
                .await?;
            Ok("0".to_string())
        } else {
            Ok("1".to_string())
        }
    }

    /// Open-ended slew toward the axis limit for the given nudge command,
    /// at the current slew rate.
    pub async fn slew_in_direction(&self, cmd: &str) -> Result<()> {
        let motors = self.motors.read().await.clone().ok_or_else(|| {
            MountError::hardware("the mount has no motors to slew with")
        })?;
        let slew_rate = self.state.read().await.slew_rate;

        let direction = match cmd {
            "Mn" => {
                motors.alt.move_to(90.0, slew_rate).await?;
                SlewDirection::Up
            }
            "Me" => {
                let target = motors.az.position() - 90.0;
                motors.az.move_to(target, slew_rate).await?;
                SlewDirection::Left
            }
            "Ms" => {
                motors.alt.move_to(0.0, slew_rate).await?;
                SlewDirection::Down
            }
            "Mw" => {
                let target = motors.az.position() + 90.0;
                motors.az.move_to(target, slew_rate).await?;
                SlewDirection::Right
            }
            other => {
                self.state.write().await.slew_direction = SlewDirection::None;
                return Err(MountError::invalid_argument(format!(
                    "unknown slew direction command {other:?}"
                )));
            }
        };
        self.state.write().await.slew_direction = direction;
        debug!(?direction, "Slewing in direction.");
        Ok(())
    }

    /// Stop both axes, braking at maximum acceleration.
    pub async fn stop_slew(&self) -> Result<()> {
        let motors = self.motors.read().await.clone().ok_or_else(|| {
            MountError::hardware("the mount has no motors to stop")
        })?;
        self.state.write().await.slew_direction = SlewDirection::None;
        let (az_result, alt_result) =
            tokio::join!(motors.az.stop_motion(), motors.alt.stop_motion());
        az_result?;
        alt_result?;
        Ok(())
    }
}
