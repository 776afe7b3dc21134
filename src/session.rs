//! The explicit session object: mode, parameters and key slots.

use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use log::debug;
use rand::Rng;

use crate::config::SessionConfig;
use crate::error::{EncnumError, Result};
use crate::keys::{Key, KeyClass, KeySet};
use crate::mode::{Mode, ModeKind};
use crate::params::ParmsId;
use crate::primitive::{
    CkksEncoder, Context, Decryptor, Encryptor, Evaluator, KeyGenerator, PublicKey, RelinKeys, SecretKey,
    Serializable,
};

/// Source of context generations; unique across every session in the process.
static NEXT_GENERATION: AtomicU64 = AtomicU64::new(1);

/// One encryption context with its mode and key slots.
///
/// Everything the codec, gateway and arithmetic engine need is read from
/// here. Reconfiguring or replacing keys needs `&mut self`, so no operation
/// can observe a half-updated session.
pub struct Session {
    pub(crate) config: SessionConfig,
    pub(crate) mode: Mode,
    pub(crate) context: Arc<Context>,
    pub(crate) evaluator: Evaluator,
    pub(crate) encoder: Option<CkksEncoder>,
    pub(crate) encryptor: Option<Encryptor>,
    pub(crate) decryptor: Option<Decryptor>,
    pub(crate) relin_keys: Option<RelinKeys>,
    pub(crate) generation: u64,
}

impl Session {
    pub fn new(config: SessionConfig) -> Result<Self> {
        let context = Context::new(config.encryption_parameters()?)?;
        let encoder = match config.mode_kind() {
            ModeKind::Float => Some(CkksEncoder::new(&context)?),
            ModeKind::Int => None,
        };
        let generation = NEXT_GENERATION.fetch_add(1, Ordering::Relaxed);
        debug!(
            "initialized {} mode: degree {}, {} coefficient primes, parms_id {}, generation {generation}",
            config.mode_kind(),
            config.poly_modulus_degree(),
            context.parms().coeff_modulus.len(),
            context.parms_id(),
        );
        Ok(Self {
            config,
            mode: config.mode(),
            evaluator: Evaluator::new(&context),
            context,
            encoder,
            encryptor: None,
            decryptor: None,
            relin_keys: None,
            generation,
        })
    }

    /// Reconfigure in place. Every key slot is cleared and values produced
    /// before the call are refused afterwards. On error the session is left
    /// as it was.
    pub fn initialize(&mut self, mode: &str, max_int: u64, poly_modulus_degree: usize) -> Result<()> {
        let config = SessionConfig::builder()
            .mode(mode.parse()?)
            .max_int(max_int)
            .poly_modulus_degree(poly_modulus_degree)
            .build()?;
        *self = Self::new(config)?;
        Ok(())
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn context(&self) -> &Arc<Context> {
        &self.context
    }

    pub fn parms_id(&self) -> ParmsId {
        self.context.parms_id()
    }

    pub fn set_public_key(&mut self, key: Option<Key>) -> Result<()> {
        self.encryptor = match self.checked(KeyClass::Public, key)? {
            Some(Key::Public(pk)) => Some(Encryptor::new(&self.context, pk)?),
            _ => None,
        };
        Ok(())
    }

    pub fn set_private_key(&mut self, key: Option<Key>) -> Result<()> {
        self.decryptor = match self.checked(KeyClass::Private, key)? {
            Some(Key::Private(sk)) => Some(Decryptor::new(&self.context, sk)?),
            _ => None,
        };
        Ok(())
    }

    pub fn set_relinearization_key(&mut self, key: Option<Key>) -> Result<()> {
        self.relin_keys = match self.checked(KeyClass::Relinearization, key)? {
            Some(Key::Relinearization(rlk)) => Some(rlk),
            _ => None,
        };
        Ok(())
    }

    /// Slot-class and context checks shared by the setters.
    fn checked(&self, slot: KeyClass, key: Option<Key>) -> Result<Option<Key>> {
        let Some(key) = key else {
            debug!("{slot} key cleared");
            return Ok(None);
        };
        if key.class() != slot {
            return Err(EncnumError::KeyType { slot, found: key.class() });
        }
        let parms_id = match &key {
            Key::Public(k) => k.parms_id(),
            Key::Private(k) => k.parms_id(),
            Key::Relinearization(k) => k.parms_id(),
        };
        if parms_id != self.context.parms_id() {
            return Err(EncnumError::KeyContextMismatch { slot });
        }
        debug!("{slot} key set");
        Ok(Some(key))
    }

    /// Fill all three slots.
    pub fn install(&mut self, keys: KeySet) -> Result<()> {
        self.set_public_key(Some(keys.public.into()))?;
        self.set_private_key(Some(keys.private.into()))?;
        self.set_relinearization_key(Some(keys.relinearization.into()))
    }

    /// Fresh keys for the current context. The slots are left untouched.
    pub fn generate_keypair(&self) -> Result<KeySet> {
        let keygen = KeyGenerator::new(&self.context)?;
        Ok(KeySet {
            public: keygen.create_public_key()?,
            private: keygen.secret_key().clone(),
            relinearization: keygen.create_relin_keys()?,
        })
    }

    pub fn generate_keypair_with_rng<R: Rng>(&self, rng: &mut R) -> Result<KeySet> {
        let keygen = KeyGenerator::with_rng(&self.context, rng)?;
        Ok(KeySet {
            public: keygen.create_public_key_with_rng(rng)?,
            private: keygen.secret_key().clone(),
            relinearization: keygen.create_relin_keys_with_rng(rng)?,
        })
    }

    pub fn load_public_key(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let key = PublicKey::load(&self.context, path)?;
        self.set_public_key(Some(key.into()))
    }

    pub fn load_private_key(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let key = SecretKey::load(&self.context, path)?;
        self.set_private_key(Some(key.into()))
    }

    pub fn load_relinearization_key(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let key = RelinKeys::load(&self.context, path)?;
        self.set_relinearization_key(Some(key.into()))
    }

    pub fn has_key(&self, slot: KeyClass) -> bool {
        match slot {
            KeyClass::Public => self.encryptor.is_some(),
            KeyClass::Private => self.decryptor.is_some(),
            KeyClass::Relinearization => self.relin_keys.is_some(),
        }
    }

    pub fn config_report(&self) -> ConfigReport {
        ConfigReport {
            mode: self.mode,
            poly_modulus_degree: self.config.poly_modulus_degree(),
            public_key: self.has_key(KeyClass::Public),
            private_key: self.has_key(KeyClass::Private),
            relinearization_key: self.has_key(KeyClass::Relinearization),
        }
    }

    /// Print the configuration report to stdout.
    pub fn display_config(&self) {
        println!("{}", self.config_report());
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("mode", &self.mode)
            .field("parms_id", &self.context.parms_id())
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

/// Human-readable snapshot of a session's settings and key slots.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ConfigReport {
    pub mode: Mode,
    pub poly_modulus_degree: usize,
    pub public_key: bool,
    pub private_key: bool,
    pub relinearization_key: bool,
}

impl fmt::Display for ConfigReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let presence = |set: bool| if set { "initialized" } else { "missing" };
        writeln!(f, "===== encnum config =====")?;
        match self.mode {
            Mode::Integer { .. } => {
                writeln!(f, "mode: integer (exact)")?;
                if let Some((min, max)) = self.mode.int_bounds() {
                    writeln!(f, "min_int: {min}")?;
                    writeln!(f, "max_int: {max}")?;
                }
            }
            Mode::Float { default_scale } => {
                writeln!(f, "mode: float (approximate)")?;
                writeln!(f, "scale: 2^{}", default_scale.log2())?;
            }
        }
        writeln!(f, "poly_modulus_degree: {}", self.poly_modulus_degree)?;
        writeln!(f, "public_key: {}", presence(self.public_key))?;
        writeln!(f, "private_key: {}", presence(self.private_key))?;
        write!(f, "relinearization_key: {}", presence(self.relinearization_key))
    }
}
