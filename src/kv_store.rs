//! Almacén clave-valor en memoria con exclusión mutua por clave.
//!
//! Sustituye a los mapas globales mutables: la caché de índices por usuario y
//! el historial por conversación se guardan aquí. El mapa sólo se bloquea para
//! copiar valores dentro/fuera; las secciones críticas largas (reconstruir un
//! índice, añadir turnos) se serializan con `lock(key)`, que no bloquea a
//! otras claves. La puerta de una clave desaparece en cuanto nadie la tiene
//! ni la espera.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::sync::OwnedMutexGuard;

/// Interfaz mínima Get/Set/Delete que consumen los componentes del núcleo.
pub trait KeyValueStore<V>: Send + Sync {
    fn get(&self, key: &str) -> Option<V>;
    fn set(&self, key: &str, value: V);
    fn delete(&self, key: &str) -> Option<V>;
}

type Gate = Arc<tokio::sync::Mutex<()>>;

pub struct KeyedStore<V> {
    entries: RwLock<HashMap<String, V>>,
    gates: Mutex<HashMap<String, Gate>>,
}

/// Sección crítica de una clave. Al soltarla, si nadie más espera por la
/// misma clave, su puerta se retira del mapa.
pub struct KeyGuard<'a> {
    guard: Option<OwnedMutexGuard<()>>,
    gates: &'a Mutex<HashMap<String, Gate>>,
    key: String,
}

impl Drop for KeyGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        // Con el mapa bloqueado nadie puede clonar la puerta: si sólo queda
        // la referencia del mapa, no hay otro poseedor ni esperas pendientes.
        let mut gates = self.gates.lock();
        if gates
            .get(&self.key)
            .is_some_and(|gate| Arc::strong_count(gate) == 1)
        {
            gates.remove(&self.key);
        }
    }
}

impl<V: Clone + Send + Sync> KeyedStore<V> {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            gates: Mutex::new(HashMap::new()),
        }
    }

    /// Adquiere la sección crítica de `key`. Claves distintas nunca compiten.
    pub async fn lock(&self, key: &str) -> KeyGuard<'_> {
        let gate = {
            let mut gates = self.gates.lock();
            gates.entry(key.to_string()).or_default().clone()
        };
        KeyGuard {
            guard: Some(gate.lock_owned().await),
            gates: &self.gates,
            key: key.to_string(),
        }
    }

    /// Puertas vivas, es decir, claves con una sección crítica tomada o
    /// esperada.
    #[cfg(test)]
    pub fn gate_count(&self) -> usize {
        self.gates.lock().len()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Copia de todos los valores (orden no especificado).
    pub fn values(&self) -> Vec<V> {
        self.entries.read().values().cloned().collect()
    }

    /// Vacía el almacén. Pensado para el cierre ordenado del proceso.
    pub fn clear(&self) {
        self.entries.write().clear();
        self.gates.lock().clear();
    }
}

impl<V: Clone + Send + Sync> Default for KeyedStore<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Clone + Send + Sync> KeyValueStore<V> for KeyedStore<V> {
    fn get(&self, key: &str) -> Option<V> {
        self.entries.read().get(key).cloned()
    }

    fn set(&self, key: &str, value: V) {
        self.entries.write().insert(key.to_string(), value);
    }

    fn delete(&self, key: &str) -> Option<V> {
        self.entries.write().remove(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn get_set_delete() {
        let store: KeyedStore<u32> = KeyedStore::new();
        assert_eq!(store.get("a"), None);
        store.set("a", 1);
        store.set("a", 2);
        assert_eq!(store.get("a"), Some(2));
        assert_eq!(store.len(), 1);
        assert_eq!(store.delete("a"), Some(2));
        assert_eq!(store.delete("a"), None);
        assert!(store.is_empty());
    }

    #[test]
    fn clear_drops_everything() {
        let store: KeyedStore<String> = KeyedStore::default();
        store.set("a", "x".into());
        store.set("b", "y".into());
        store.clear();
        assert!(store.is_empty());
        assert!(store.values().is_empty());
    }

    #[tokio::test]
    async fn same_key_is_mutually_exclusive() {
        let store: Arc<KeyedStore<u32>> = Arc::new(KeyedStore::new());
        let guard = store.lock("u1").await;

        let contender = {
            let store = store.clone();
            tokio::spawn(async move {
                let _g = store.lock("u1").await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(guard);
        contender.await.unwrap();
    }

    #[tokio::test]
    async fn released_gates_are_dropped() {
        let store: KeyedStore<u32> = KeyedStore::new();
        for i in 0..100 {
            let key = format!("k{i}");
            let _g = store.lock(&key).await;
            store.set(&key, i);
            assert_eq!(store.gate_count(), 1);
        }
        assert_eq!(store.gate_count(), 0);
        assert_eq!(store.len(), 100);
    }

    #[tokio::test]
    async fn gate_survives_while_someone_waits() {
        let store: Arc<KeyedStore<u32>> = Arc::new(KeyedStore::new());
        let guard = store.lock("u1").await;

        let waiter = {
            let store = store.clone();
            tokio::spawn(async move {
                let _g = store.lock("u1").await;
                store.gate_count()
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(guard);
        assert_eq!(store.gate_count(), 1);

        assert_eq!(waiter.await.unwrap(), 1);
        assert_eq!(store.gate_count(), 0);
    }

    #[tokio::test]
    async fn different_keys_do_not_block() {
        let store: KeyedStore<u32> = KeyedStore::new();
        let _a = store.lock("u1").await;
        let b = tokio::time::timeout(Duration::from_millis(100), store.lock("u2")).await;
        assert!(b.is_ok());
    }
}
